// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backoff::Backoff;

/// Where and how to connect. Kept by the session for reconnection attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Transport endpoint (`ws://`, `wss://`, `http://` or `https://`).
    pub url: String,
    /// Opaque key-value payload forwarded in the transport handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Map<String, Value>>,
    /// Require an encrypted transport.
    #[serde(default)]
    pub secure: bool,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), auth: None, secure: false }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Map<String, Value>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Add a single auth entry, creating the payload if absent.
    #[must_use]
    pub fn with_auth_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.auth.get_or_insert_with(Map::new).insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }
}

impl SessionSettings {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_base_delay, self.max_reconnect_attempts)
    }
}

/// Terminal chat client for roomlink rooms.
#[derive(Debug, Parser)]
#[command(name = "roomlink", version, about)]
pub struct Config {
    /// Room backend endpoint.
    #[arg(long, env = "ROOMLINK_URL", default_value = "ws://127.0.0.1:3001/ws")]
    pub url: String,

    /// Room to join.
    #[arg(long, env = "ROOMLINK_ROOM")]
    pub room: String,

    /// User id to join as.
    #[arg(long, env = "ROOMLINK_USER")]
    pub user: String,

    /// Auth token forwarded in the handshake.
    #[arg(long, env = "ROOMLINK_TOKEN")]
    pub token: Option<String>,

    /// Require an encrypted transport (upgrades ws:// to wss://).
    #[arg(long, env = "ROOMLINK_SECURE")]
    pub secure: bool,

    /// Heartbeat interval in milliseconds.
    #[arg(long, env = "ROOMLINK_HEARTBEAT_MS", default_value_t = 25_000)]
    pub heartbeat_ms: u64,

    /// Base reconnect delay in milliseconds (doubles per attempt).
    #[arg(long, env = "ROOMLINK_RECONNECT_BASE_MS", default_value_t = 1_000)]
    pub reconnect_base_ms: u64,

    /// Maximum consecutive reconnect attempts.
    #[arg(long, env = "ROOMLINK_MAX_RECONNECTS", default_value_t = 5)]
    pub max_reconnects: u32,

    /// Log level filter.
    #[arg(long, env = "ROOMLINK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json).
    #[arg(long, env = "ROOMLINK_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.room.trim().is_empty() {
            anyhow::bail!("--room must not be empty");
        }
        if self.user.trim().is_empty() {
            anyhow::bail!("--user must not be empty");
        }
        if self.heartbeat_ms == 0 {
            anyhow::bail!("--heartbeat-ms must be positive");
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(&self.url).with_secure(self.secure);
        match self.token {
            Some(ref token) => config.with_auth_entry("token", token.as_str()),
            None => config,
        }
    }

    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_reconnect_attempts: self.max_reconnects,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
