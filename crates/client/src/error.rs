// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local failures the session absorbs instead of surfacing to callers.
///
/// None of these are fatal: the session stays usable after every one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionError {
    /// No connected transport to hand the frame to.
    NotConnected,
    /// Message content was empty after trimming.
    EmptyMessage,
    /// The session has been destroyed.
    Destroyed,
    /// The outbound payload could not be serialized.
    Encode,
    /// The transport refused the frame.
    Transport,
}

impl SessionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::Destroyed => "DESTROYED",
            Self::Encode => "ENCODE",
            Self::Transport => "TRANSPORT",
        }
    }

    /// Human-readable description used in log lines.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NotConnected => "no connected transport",
            Self::EmptyMessage => "message content is empty",
            Self::Destroyed => "session has been destroyed",
            Self::Encode => "payload could not be encoded",
            Self::Transport => "transport refused the frame",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
