// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine.
//!
//! All mutation happens under the session's core lock. Notifications are
//! queued for the dispatcher while the lock is held, so subscribers observe
//! transitions in the order they happened.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::{heartbeat, reconnect, Dispatch, Shared};
use crate::backoff::Backoff;
use crate::config::{SessionConfig, SessionSettings};
use crate::error::SessionError;
use crate::protocol::{Command, EventKind, SessionEvent};
use crate::router::Notifier;
use crate::state::{epoch_ms, ConnectionState, ConnectionStats, StateChange};
use crate::timer::TimerSlot;
use crate::transport::{CloseReason, Transport, TransportEvent, TransportSink};

pub(super) struct Core {
    session_id: Uuid,
    state: ConnectionState,
    stats: ConnectionStats,
    /// Retained for scheduler-driven retries and `force_reconnect`.
    config: Option<SessionConfig>,
    settings: SessionSettings,
    backoff: Backoff,
    transport: Box<dyn Transport>,
    /// Bumped on every teardown; sinks and timers stamped with an older value
    /// are ignored.
    generation: u64,
    /// The transport has been opened for the current generation and has not
    /// reported close or connect error since.
    live: bool,
    heartbeat: TimerSlot,
    reconnect: TimerSlot,
    destroyed: bool,
    notifier: Notifier,
    shared: Weak<Shared>,
}

impl Core {
    pub(super) fn new(
        session_id: Uuid,
        transport: Box<dyn Transport>,
        settings: SessionSettings,
        notifier: Notifier,
        shared: Weak<Shared>,
    ) -> Self {
        Self {
            session_id,
            state: ConnectionState::Disconnected,
            stats: ConnectionStats::default(),
            config: None,
            settings,
            backoff: settings.backoff(),
            transport,
            generation: 0,
            live: false,
            heartbeat: TimerSlot::new("heartbeat"),
            reconnect: TimerSlot::new("reconnect"),
            destroyed: false,
            notifier,
            shared,
        }
    }

    pub(super) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(super) fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub(super) fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.live
    }

    pub(super) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // -- Public operations ----------------------------------------------------

    pub(super) fn connect(&mut self, config: SessionConfig) {
        if self.destroyed {
            warn!(session_id = %self.session_id, "connect on destroyed session ignored");
            return;
        }
        info!(session_id = %self.session_id, url = %config.url, "connecting");
        self.stats.reconnect_attempts = 0;
        self.config = Some(config);
        self.open_transport();
    }

    pub(super) fn disconnect(&mut self) {
        self.teardown();
        self.stats.reconnect_attempts = 0;
        if self.state != ConnectionState::Disconnected {
            self.stats.disconnect_time = Some(epoch_ms());
            info!(session_id = %self.session_id, "disconnected");
            self.transition(ConnectionState::Disconnected);
        }
    }

    pub(super) fn force_reconnect(&mut self) {
        if self.destroyed {
            warn!(session_id = %self.session_id, "force reconnect on destroyed session ignored");
            return;
        }
        if self.config.is_none() {
            warn!(session_id = %self.session_id, "force reconnect before any connect ignored");
            return;
        }
        info!(session_id = %self.session_id, state = %self.state, "forcing reconnect");
        self.stats.reconnect_attempts = 0;
        self.open_transport();
    }

    /// Returns false if the session was already destroyed.
    pub(super) fn destroy(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.disconnect();
        self.destroyed = true;
        self.config = None;
        info!(session_id = %self.session_id, "session destroyed");
        true
    }

    pub(super) fn emit(&mut self, command: &Command) -> Dispatch {
        if self.destroyed {
            return Dispatch::Dropped(SessionError::Destroyed);
        }
        if !self.is_connected() {
            return Dispatch::Dropped(SessionError::NotConnected);
        }
        let frame = match command.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = %self.session_id, event = command.name(), err = %e, "encode failed");
                return Dispatch::Dropped(SessionError::Encode);
            }
        };
        match self.transport.send(frame) {
            Ok(()) => Dispatch::Sent,
            Err(e) => Dispatch::Dropped(e),
        }
    }

    /// Account for an outbound chat message the transport accepted.
    pub(super) fn record_message(&mut self) {
        self.stats.total_messages += 1;
        self.stats.last_message_time = Some(epoch_ms());
    }

    // -- Transport notifications ----------------------------------------------

    pub(super) fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if self.destroyed || !self.live || generation != self.generation {
            trace!(
                session_id = %self.session_id,
                generation,
                current = self.generation,
                "stale transport notification ignored"
            );
            return;
        }
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Close(reason) => self.on_close(reason),
            TransportEvent::ConnectError(err) => self.on_connect_error(err),
            TransportEvent::Message { event, payload } => self.on_message(&event, payload),
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!(session_id = %self.session_id, state = %self.state, "open outside connecting ignored");
            return;
        }
        self.stats.connect_time = Some(epoch_ms());
        self.stats.reconnect_attempts = 0;
        self.reconnect.cancel();
        heartbeat::start(
            &mut self.heartbeat,
            self.shared.clone(),
            self.generation,
            self.settings.heartbeat_interval,
        );
        info!(session_id = %self.session_id, "connected");
        self.transition(ConnectionState::Connected);
    }

    fn on_close(&mut self, reason: CloseReason) {
        self.heartbeat.cancel();
        self.live = false;
        self.stats.disconnect_time = Some(epoch_ms());
        if reason.is_intentional() {
            info!(session_id = %self.session_id, %reason, "connection closed");
            self.transition(ConnectionState::Disconnected);
            return;
        }
        warn!(session_id = %self.session_id, %reason, "connection lost");
        self.schedule_reconnect();
    }

    fn on_connect_error(&mut self, err: String) {
        if self.state == ConnectionState::Connected {
            warn!(session_id = %self.session_id, err = %err, "transport error while connected");
            self.notify(SessionEvent::local_error("TRANSPORT_ERROR", err));
            return;
        }
        self.heartbeat.cancel();
        self.live = false;
        warn!(session_id = %self.session_id, err = %err, "connect failed");
        self.notify(SessionEvent::local_error("CONNECT_ERROR", err));
        self.transition(ConnectionState::Error);
        self.schedule_reconnect();
    }

    fn on_message(&mut self, name: &str, payload: Value) {
        let Some(kind) = EventKind::from_wire(name) else {
            warn!(session_id = %self.session_id, event = name, "unknown inbound event ignored");
            return;
        };
        if let Some(event) = SessionEvent::inbound(kind, payload) {
            self.stats.messages_received += 1;
            self.notify(event);
        }
    }

    // -- Timers ---------------------------------------------------------------

    /// Heartbeat tick. Returns false once the heartbeat should stop.
    pub(super) fn beat(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.is_connected() {
            return false;
        }
        match self.transport.ping() {
            Ok(()) => {
                self.stats.heartbeats_sent += 1;
                trace!(session_id = %self.session_id, sent = self.stats.heartbeats_sent, "heartbeat");
            }
            Err(e) => debug!(session_id = %self.session_id, err = %e, "heartbeat ping failed"),
        }
        true
    }

    /// Scheduled retry fired.
    pub(super) fn reconnect_due(&mut self, generation: u64) {
        if self.destroyed
            || generation != self.generation
            || self.state != ConnectionState::Reconnecting
        {
            return;
        }
        self.reconnect.cancel();
        debug!(
            session_id = %self.session_id,
            attempt = self.stats.reconnect_attempts,
            "reconnect attempt"
        );
        self.open_transport();
    }

    fn schedule_reconnect(&mut self) {
        if self.destroyed {
            return;
        }
        match self.backoff.next_attempt(&mut self.stats.reconnect_attempts) {
            Some(delay) => {
                info!(
                    session_id = %self.session_id,
                    attempt = self.stats.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.transition(ConnectionState::Reconnecting);
                reconnect::schedule(&mut self.reconnect, self.shared.clone(), self.generation, delay);
            }
            None => {
                let attempts = self.stats.reconnect_attempts;
                error!(session_id = %self.session_id, attempts, "reconnect attempts exhausted");
                if self.state != ConnectionState::Error {
                    self.transition(ConnectionState::Error);
                }
                self.notify(SessionEvent::local_error(
                    "RECONNECT_EXHAUSTED",
                    format!("gave up after {attempts} reconnect attempts"),
                ));
            }
        }
    }

    // -- Internals ------------------------------------------------------------

    fn open_transport(&mut self) {
        let Some(config) = self.config.clone() else {
            warn!(session_id = %self.session_id, "no stored config, cannot open transport");
            return;
        };
        self.teardown();
        self.transition(ConnectionState::Connecting);
        let sink = self.sink();
        self.live = true;
        debug!(
            session_id = %self.session_id,
            url = %config.url,
            generation = self.generation,
            "opening transport"
        );
        self.transport.open(&config, sink);
    }

    /// Cancel both timers, close a live transport, and fence out its sink.
    fn teardown(&mut self) {
        self.heartbeat.cancel();
        self.reconnect.cancel();
        if self.live {
            self.transport.close(CloseReason::ClientDisconnect);
            self.live = false;
        }
        self.generation += 1;
    }

    fn sink(&self) -> TransportSink {
        let shared = self.shared.clone();
        TransportSink::new(
            self.generation,
            Arc::new(move |generation: u64, event: TransportEvent| {
                if let Some(shared) = shared.upgrade() {
                    shared.core.lock().on_transport_event(generation, event);
                }
            }),
        )
    }

    /// Move to `next`, queueing exactly one state-change notification.
    /// Transitions outside the table are refused.
    fn transition(&mut self, next: ConnectionState) -> bool {
        let previous = self.state;
        if previous == next {
            return false;
        }
        if !previous.can_transition_to(next) {
            error!(session_id = %self.session_id, from = %previous, to = %next, "invalid transition refused");
            return false;
        }
        self.state = next;
        debug!(session_id = %self.session_id, from = %previous, to = %next, "state change");
        self.notify(SessionEvent::ConnectionStateChange(StateChange {
            previous,
            state: next,
            stats: self.stats.clone(),
        }));
        true
    }

    fn notify(&self, event: SessionEvent) {
        if !self.notifier.notify(event) {
            trace!(session_id = %self.session_id, "dispatcher gone, notification dropped");
        }
    }
}
