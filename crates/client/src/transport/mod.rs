// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transport collaborator: a duplex, message-framed connection.
//!
//! The session drives a [`Transport`] through `open`/`close`/`send`/`ping`
//! and learns about lifecycle changes and inbound frames through the
//! [`TransportSink`] handed to `open`.

pub mod ws;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// A named protocol frame: `{"event": "...", "data": ...}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Why a connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed locally on purpose. Never retried.
    ClientDisconnect,
    /// The backend closed the connection.
    ServerDisconnect,
    /// The connection failed underneath us.
    TransportError(String),
}

impl CloseReason {
    pub fn is_intentional(&self) -> bool {
        matches!(self, Self::ClientDisconnect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientDisconnect => "client disconnect",
            Self::ServerDisconnect => "server disconnect",
            Self::TransportError(_) => "transport error",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError(detail) if !detail.is_empty() => {
                write!(f, "{}: {detail}", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Lifecycle and inbound notifications reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Close(CloseReason),
    ConnectError(String),
    Message { event: String, payload: Value },
}

type Deliver = Arc<dyn Fn(u64, TransportEvent) + Send + Sync>;

/// Callback handle a transport reports through.
///
/// Each sink is stamped with the generation of the `open` call that created
/// it; the session ignores notifications from superseded generations.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    deliver: Deliver,
}

impl TransportSink {
    pub fn new(generation: u64, deliver: Deliver) -> Self {
        Self { generation, deliver }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        (self.deliver)(self.generation, TransportEvent::Open);
    }

    pub fn closed(&self, reason: CloseReason) {
        (self.deliver)(self.generation, TransportEvent::Close(reason));
    }

    pub fn connect_error(&self, err: impl Into<String>) {
        (self.deliver)(self.generation, TransportEvent::ConnectError(err.into()));
    }

    pub fn message(&self, event: impl Into<String>, payload: Value) {
        (self.deliver)(self.generation, TransportEvent::Message { event: event.into(), payload });
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink").field("generation", &self.generation).finish()
    }
}

/// Connection primitive the session is built on.
///
/// Implementations must not report through the sink from inside any of these
/// methods; notifications are expected from the transport's own task.
pub trait Transport: Send {
    /// Start opening a connection. The outcome arrives later as `opened` or
    /// `connect_error` on `sink`.
    fn open(&mut self, config: &SessionConfig, sink: TransportSink);

    /// Close the current connection, if any. A locally closed connection
    /// does not report back through its sink.
    fn close(&mut self, reason: CloseReason);

    /// Hand `frame` to the connection without waiting for delivery.
    fn send(&mut self, frame: Frame) -> Result<(), SessionError>;

    /// Emit a liveness signal.
    fn ping(&mut self) -> Result<(), SessionError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, config: &SessionConfig, sink: TransportSink) {
        (**self).open(config, sink)
    }

    fn close(&mut self, reason: CloseReason) {
        (**self).close(reason)
    }

    fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        (**self).send(frame)
    }

    fn ping(&mut self) -> Result<(), SessionError> {
        (**self).ping()
    }
}
