// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mocks, recorders, and assertion helpers.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::{EventKind, SessionEvent};
use crate::router::Handler;
use crate::state::{ConnectionState, StateChange};
use crate::transport::{CloseReason, Frame, Transport, TransportSink};

pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        assert!(result.is_err(), concat!("expected Err for: ", stringify!($expr)));
        if let Err(err) = result {
            let msg = err.to_string();
            assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
        }
    }};
}

/// Coerce a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Collects every event delivered to its handlers.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> impl Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &SessionEvent| {
            events.lock().push(event.clone());
            Ok(())
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<SessionEvent> {
        self.events.lock().iter().filter(|e| e.kind() == kind).cloned().collect()
    }

    pub fn payloads(&self, kind: EventKind) -> Vec<Value> {
        self.of_kind(kind).iter().filter_map(|e| e.payload().cloned()).collect()
    }

    /// Recorded state changes, in delivery order.
    pub fn changes(&self) -> Vec<StateChange> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ConnectionStateChange(change) => Some(change.clone()),
                _ => None,
            })
            .collect()
    }

    /// Target state of every recorded transition.
    pub fn states(&self) -> Vec<ConnectionState> {
        self.changes().iter().map(|c| c.state).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[derive(Default)]
struct MockInner {
    sink: Option<TransportSink>,
    sinks: Vec<TransportSink>,
    opens: Vec<SessionConfig>,
    closes: Vec<CloseReason>,
    sent: Vec<Frame>,
    pings: usize,
    refuse_sends: bool,
}

/// Scriptable in-memory transport.
///
/// The test drives the connection lifecycle with [`accept`](Self::accept),
/// [`drop_connection`](Self::drop_connection), [`refuse`](Self::refuse) and
/// [`deliver`](Self::deliver). Every call clones the sink out of the lock
/// before reporting, so the session may call back into the mock.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_sink(&self) -> Option<TransportSink> {
        self.inner.lock().sink.clone()
    }

    /// Complete the pending open. Returns false if nothing is pending.
    pub fn accept(&self) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.opened();
                true
            }
            None => false,
        }
    }

    /// Fail the pending open with `err`.
    pub fn refuse(&self, err: &str) -> bool {
        let sink = self.inner.lock().sink.take();
        match sink {
            Some(sink) => {
                sink.connect_error(err);
                true
            }
            None => false,
        }
    }

    /// Drop the live connection from the far side.
    pub fn drop_connection(&self, reason: CloseReason) -> bool {
        let sink = self.inner.lock().sink.take();
        match sink {
            Some(sink) => {
                sink.closed(reason);
                true
            }
            None => false,
        }
    }

    /// Push an inbound frame.
    pub fn deliver(&self, event: &str, payload: Value) -> bool {
        match self.current_sink() {
            Some(sink) => {
                sink.message(event, payload);
                true
            }
            None => false,
        }
    }

    /// Sink handed to the `n`th open (0-based), still reachable after the
    /// connection is gone.
    pub fn sink_at(&self, n: usize) -> Option<TransportSink> {
        self.inner.lock().sinks.get(n).cloned()
    }

    pub fn refuse_sends(&self, refuse: bool) {
        self.inner.lock().refuse_sends = refuse;
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().opens.len()
    }

    pub fn opens(&self) -> Vec<SessionConfig> {
        self.inner.lock().opens.clone()
    }

    pub fn closes(&self) -> Vec<CloseReason> {
        self.inner.lock().closes.clone()
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_events(&self) -> Vec<String> {
        self.inner.lock().sent.iter().map(|f| f.event.clone()).collect()
    }

    pub fn pings(&self) -> usize {
        self.inner.lock().pings
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().sink.is_some()
    }
}

impl Transport for MockTransport {
    fn open(&mut self, config: &SessionConfig, sink: TransportSink) {
        let mut inner = self.inner.lock();
        inner.opens.push(config.clone());
        inner.sinks.push(sink.clone());
        inner.sink = Some(sink);
    }

    fn close(&mut self, reason: CloseReason) {
        let mut inner = self.inner.lock();
        if inner.sink.take().is_some() {
            inner.closes.push(reason);
        }
    }

    fn send(&mut self, frame: Frame) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.sink.is_none() {
            return Err(SessionError::NotConnected);
        }
        if inner.refuse_sends {
            return Err(SessionError::Transport);
        }
        inner.sent.push(frame);
        Ok(())
    }

    fn ping(&mut self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.sink.is_none() {
            return Err(SessionError::NotConnected);
        }
        inner.pings += 1;
        Ok(())
    }
}
