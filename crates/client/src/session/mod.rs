// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The room session: connection state machine, reconnection scheduler,
//! heartbeat monitor, and the typed room protocol on top.
//!
//! Every public method is synchronous and infallible. Failures are absorbed,
//! logged, and surfaced through the `error` and `connectionStateChange`
//! notifications. A [`Session`] must be created inside a tokio runtime.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, SessionSettings};
use crate::error::SessionError;
use crate::protocol::{ChatMessage, Command, EventKind, RoomMember, RoomQuery, SessionEvent, TypingSignal};
use crate::router::{spawn_dispatcher, EventRouter, HandlerId};
use crate::state::{ConnectionState, ConnectionStats};
use crate::transport::ws::WsTransport;
use crate::transport::Transport;

mod heartbeat;
mod machine;
mod reconnect;

use self::machine::Core;

/// Outcome of handing a command to the transport.
///
/// `Sent` only means the local transport accepted the frame; no server
/// acknowledgment is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    Dropped(SessionError),
}

impl Dispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

pub(crate) struct Shared {
    id: Uuid,
    core: Mutex<Core>,
    router: Arc<Mutex<EventRouter>>,
}

/// Handle to one session. Clones share the same connection.
///
/// The connection and its timers live until [`destroy`](Session::destroy) is
/// called or the last handle is dropped. A handler that captures a handle keeps
/// the session alive until `destroy`.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(transport: impl Transport + 'static, settings: SessionSettings) -> Self {
        let id = Uuid::new_v4();
        let router = Arc::new(Mutex::new(EventRouter::new()));
        let notifier = spawn_dispatcher(id, Arc::clone(&router));
        let shared = Arc::new_cyclic(|weak| Shared {
            id,
            core: Mutex::new(Core::new(id, Box::new(transport), settings, notifier, weak.clone())),
            router,
        });
        debug!(session_id = %id, "session created");
        Self { shared }
    }

    /// A session over the WebSocket transport.
    pub fn websocket(settings: SessionSettings) -> Self {
        Self::new(WsTransport::new(), settings)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    // -- Connection lifecycle -------------------------------------------------

    /// Tear down any current transport and open a new one with `config`.
    /// The outcome arrives as `connectionStateChange` notifications.
    pub fn connect(&self, config: SessionConfig) {
        self.shared.core.lock().connect(config);
    }

    /// Close the transport, cancel pending timers, and move to
    /// `Disconnected`. Idempotent.
    pub fn disconnect(&self) {
        self.shared.core.lock().disconnect();
    }

    /// Reopen with the stored config and a fresh attempt budget.
    pub fn force_reconnect(&self) {
        self.shared.core.lock().force_reconnect();
    }

    /// Disconnect, drop every handler, and refuse further work. Idempotent.
    pub fn destroy(&self) {
        self.shared.router.lock().close();
        self.shared.core.lock().destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.core.lock().is_destroyed()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.core.lock().is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.core.lock().state()
    }

    /// Snapshot of the connection telemetry.
    pub fn stats(&self) -> ConnectionStats {
        self.shared.core.lock().stats().clone()
    }

    // -- Subscriptions --------------------------------------------------------

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.router.lock().on(kind, Arc::new(handler))
    }

    /// Remove one handler, or all handlers for `kind` when `id` is `None`.
    pub fn off(&self, kind: EventKind, id: Option<HandlerId>) -> usize {
        self.shared.router.lock().off(kind, id)
    }

    // -- Outbound protocol ----------------------------------------------------

    /// Send an arbitrary command. Dropped (and logged) unless connected.
    pub fn emit(&self, command: Command) -> Dispatch {
        let dispatch = self.shared.core.lock().emit(&command);
        self.log_drop(&command, dispatch);
        dispatch
    }

    pub fn join_room(&self, room_id: &str, user_id: &str) -> Dispatch {
        self.emit(Command::JoinRoom(member(room_id, user_id)))
    }

    pub fn leave_room(&self, room_id: &str, user_id: &str) -> Dispatch {
        self.emit(Command::LeaveRoom(member(room_id, user_id)))
    }

    /// Send a chat message. Content is trimmed; empty content never reaches
    /// the transport. Counts toward `total_messages` only once accepted.
    pub fn send_message(&self, room_id: &str, user_id: &str, content: &str) -> Dispatch {
        let content = content.trim();
        if content.is_empty() {
            warn!(session_id = %self.shared.id, room_id, "empty message dropped");
            return Dispatch::Dropped(SessionError::EmptyMessage);
        }
        let command = Command::SendMessage(ChatMessage {
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
            content: content.to_owned(),
        });
        let dispatch = {
            let mut core = self.shared.core.lock();
            let dispatch = core.emit(&command);
            if dispatch.is_sent() {
                core.record_message();
            }
            dispatch
        };
        self.log_drop(&command, dispatch);
        dispatch
    }

    /// Best-effort typing signal. Silently skipped while disconnected.
    pub fn set_typing(&self, room_id: &str, user_id: &str, is_typing: bool) -> Dispatch {
        let command = Command::Typing(TypingSignal {
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
            is_typing,
        });
        let dispatch = self.shared.core.lock().emit(&command);
        if let Dispatch::Dropped(err) = dispatch {
            debug!(session_id = %self.shared.id, room_id, %err, "typing signal skipped");
        }
        dispatch
    }

    /// Ask for room metadata. The answer arrives as a `room-info` notification.
    pub fn get_room_info(&self, room_id: &str) -> Dispatch {
        self.emit(Command::GetRoomInfo(RoomQuery { room_id: room_id.to_owned() }))
    }

    fn log_drop(&self, command: &Command, dispatch: Dispatch) {
        if let Dispatch::Dropped(err) = dispatch {
            warn!(session_id = %self.shared.id, event = command.name(), %err, reason = err.describe(), "command dropped");
        }
    }
}

fn member(room_id: &str, user_id: &str) -> RoomMember {
    RoomMember { room_id: room_id.to_owned(), user_id: user_id.to_owned() }
}

#[cfg(test)]
#[path = "../session_tests.rs"]
mod tests;
