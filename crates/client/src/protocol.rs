// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room session protocol vocabulary.
//!
//! Outbound commands are typed payloads serialized to `{event, data}` frames.
//! Inbound notifications are routed by [`EventKind`]; their payloads belong to
//! the backend and pass through unvalidated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::StateChange;
use crate::transport::Frame;

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: String,
    pub user_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub room_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub room_id: String,
}

/// An outbound protocol command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    JoinRoom(RoomMember),
    LeaveRoom(RoomMember),
    SendMessage(ChatMessage),
    Typing(TypingSignal),
    GetRoomInfo(RoomQuery),
}

impl Command {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::LeaveRoom(_) => "leave-room",
            Self::SendMessage(_) => "send-message",
            Self::Typing(_) => "typing",
            Self::GetRoomInfo(_) => "get-room-info",
        }
    }

    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        let data = match self {
            Self::JoinRoom(p) | Self::LeaveRoom(p) => serde_json::to_value(p)?,
            Self::SendMessage(p) => serde_json::to_value(p)?,
            Self::Typing(p) => serde_json::to_value(p)?,
            Self::GetRoomInfo(p) => serde_json::to_value(p)?,
        };
        Ok(Frame { event: self.name().to_owned(), data })
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Every event name a subscriber can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinedRoom,
    LeftRoom,
    UserJoined,
    UserLeft,
    NewMessage,
    UserTyping,
    RoomInfo,
    Error,
    /// Synthetic: emitted by the session itself, never accepted from the wire.
    ConnectionStateChange,
}

impl EventKind {
    /// Kinds the backend may send.
    pub const INBOUND: [EventKind; 8] = [
        Self::JoinedRoom,
        Self::LeftRoom,
        Self::UserJoined,
        Self::UserLeft,
        Self::NewMessage,
        Self::UserTyping,
        Self::RoomInfo,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinedRoom => "joined-room",
            Self::LeftRoom => "left-room",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::NewMessage => "new-message",
            Self::UserTyping => "user-typing",
            Self::RoomInfo => "room-info",
            Self::Error => "error",
            Self::ConnectionStateChange => "connectionStateChange",
        }
    }

    /// Resolve an inbound wire name. Unknown names (and the synthetic
    /// state-change name) yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::INBOUND.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    JoinedRoom(Value),
    LeftRoom(Value),
    UserJoined(Value),
    UserLeft(Value),
    NewMessage(Value),
    UserTyping(Value),
    RoomInfo(Value),
    Error(Value),
    ConnectionStateChange(StateChange),
}

impl SessionEvent {
    /// Wrap a backend payload. Returns `None` for the synthetic kind.
    pub fn inbound(kind: EventKind, payload: Value) -> Option<Self> {
        let event = match kind {
            EventKind::JoinedRoom => Self::JoinedRoom(payload),
            EventKind::LeftRoom => Self::LeftRoom(payload),
            EventKind::UserJoined => Self::UserJoined(payload),
            EventKind::UserLeft => Self::UserLeft(payload),
            EventKind::NewMessage => Self::NewMessage(payload),
            EventKind::UserTyping => Self::UserTyping(payload),
            EventKind::RoomInfo => Self::RoomInfo(payload),
            EventKind::Error => Self::Error(payload),
            EventKind::ConnectionStateChange => return None,
        };
        Some(event)
    }

    /// A locally raised `error` notification.
    pub fn local_error(code: &str, message: impl Into<String>) -> Self {
        Self::Error(serde_json::json!({ "code": code, "message": message.into() }))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::JoinedRoom(_) => EventKind::JoinedRoom,
            Self::LeftRoom(_) => EventKind::LeftRoom,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::RoomInfo(_) => EventKind::RoomInfo,
            Self::Error(_) => EventKind::Error,
            Self::ConnectionStateChange(_) => EventKind::ConnectionStateChange,
        }
    }

    /// Backend payload, if this is an inbound notification.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::JoinedRoom(v)
            | Self::LeftRoom(v)
            | Self::UserJoined(v)
            | Self::UserLeft(v)
            | Self::NewMessage(v)
            | Self::UserTyping(v)
            | Self::RoomInfo(v)
            | Self::Error(v) => Some(v),
            Self::ConnectionStateChange(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
