// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle states, the transition table, and session telemetry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session's connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection budget exhausted (or a connect error awaiting the scheduler).
    Error,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 5] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Reconnecting,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether `self -> next` is an edge of the transition table.
    ///
    /// Self-loops are not transitions and always return `false`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected | Reconnecting | Error | Disconnected)
                | (Connected, Connecting | Reconnecting | Error | Disconnected)
                | (Reconnecting, Connecting | Error | Disconnected)
                | (Error, Connecting | Reconnecting | Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection telemetry. Owned by the session; callers only ever see copies.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Epoch millis of the last successful connect.
    pub connect_time: Option<u64>,
    /// Epoch millis of the last disconnect (intentional or not).
    pub disconnect_time: Option<u64>,
    /// Consecutive scheduled retries. Reset on every successful connect.
    pub reconnect_attempts: u32,
    /// Outbound chat messages accepted by the transport.
    pub total_messages: u64,
    /// Epoch millis of the last accepted outbound chat message.
    pub last_message_time: Option<u64>,
    pub heartbeats_sent: u64,
    /// Inbound protocol frames routed to subscribers.
    pub messages_received: u64,
}

/// Payload of the synthetic `connectionStateChange` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub previous: ConnectionState,
    pub state: ConnectionState,
    pub stats: ConnectionStats,
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
