// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event router: ordered handler lists per [`EventKind`].
//!
//! Handlers run in registration order. A handler that returns `Err` or panics
//! is logged and skipped; the remaining handlers still run and the registry is
//! left untouched.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::protocol::{EventKind, SessionEvent};

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync>;

/// Identifies one registration, for removal with [`EventRouter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
    next_id: u64,
    closed: bool,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `kind`.
    ///
    /// A closed router hands out an id but never stores the handler.
    pub fn on(&mut self, kind: EventKind, handler: Handler) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        if self.closed {
            debug!(event = %kind, "router closed, handler not registered");
            return id;
        }
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove one registration, or every handler for `kind` when `id` is `None`.
    /// Returns how many handlers were removed.
    pub fn off(&mut self, kind: EventKind, id: Option<HandlerId>) -> usize {
        match id {
            Some(id) => {
                let Some(list) = self.handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                let removed = before - list.len();
                if list.is_empty() {
                    self.handlers.remove(&kind);
                }
                removed
            }
            None => self.handlers.remove(&kind).map_or(0, |list| list.len()),
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Snapshot of the handlers for `kind`, in registration order.
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Deliver `event` to every handler registered for its kind.
    /// Returns the number of handlers that failed.
    pub fn emit_to_handlers(&self, event: &SessionEvent) -> usize {
        deliver(&self.handlers_for(event.kind()), event)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Drop every handler and refuse new registrations.
    pub fn close(&mut self) {
        self.closed = true;
        self.handlers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Invoke `handlers` in order with `event`, isolating failures.
/// Returns the number of handlers that failed.
pub fn deliver(handlers: &[Handler], event: &SessionEvent) -> usize {
    let mut failed = 0;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                error!(event = %event.kind(), err = %format!("{e:#}"), "event handler failed");
            }
            Err(_) => {
                failed += 1;
                error!(event = %event.kind(), "event handler panicked");
            }
        }
    }
    failed
}

/// A queued event together with the handlers registered when it was raised.
type Queued = (Vec<Handler>, SessionEvent);

/// Queues events for the dispatcher.
///
/// The handler list is captured at queue time: a handler added after an event
/// was raised never sees it, and one removed afterwards still does.
pub(crate) struct Notifier {
    router: Arc<Mutex<EventRouter>>,
    tx: mpsc::UnboundedSender<Queued>,
}

impl Notifier {
    /// Returns false once the dispatcher has stopped.
    pub(crate) fn notify(&self, event: SessionEvent) -> bool {
        let handlers = self.router.lock().handlers_for(event.kind());
        if handlers.is_empty() {
            return true;
        }
        self.tx.send((handlers, event)).is_ok()
    }
}

/// Spawn the task that runs queued notifications.
///
/// Handlers are invoked without holding the router lock, so they may
/// subscribe, unsubscribe, or call back into the session.
pub(crate) fn spawn_dispatcher(session_id: Uuid, router: Arc<Mutex<EventRouter>>) -> Notifier {
    let (tx, mut rx) = mpsc::unbounded_channel::<Queued>();
    tokio::spawn(async move {
        while let Some((handlers, event)) = rx.recv().await {
            let failed = deliver(&handlers, &event);
            if failed > 0 {
                debug!(%session_id, event = %event.kind(), failed, "handlers failed during dispatch");
            }
        }
        debug!(%session_id, "dispatcher stopped");
    });
    Notifier { router, tx }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
