// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owned, cancellable background task slots.
//!
//! A session keeps one [`TimerSlot`] per timer role (heartbeat, reconnect).
//! Arming a slot cancels whatever it held before, so a role never has two
//! live tasks.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::trace;

pub struct TimerSlot {
    role: &'static str,
    cancel: Option<CancellationToken>,
}

impl TimerSlot {
    pub fn new(role: &'static str) -> Self {
        Self { role, cancel: None }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Whether the slot holds a task that has not been cancelled.
    pub fn is_armed(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }

    /// Cancel the current task (if any) and spawn the one built by `task`.
    ///
    /// The spawned future is dropped at its next await point once the slot is
    /// cancelled, re-armed, or dropped.
    pub fn arm<F, Fut>(&mut self, task: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        let fut = task();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = fut => {}
            }
        });
        trace!(role = self.role, "timer armed");
        self.cancel = Some(cancel);
    }

    /// Cancel the current task. Returns whether a live task was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(token) => {
                let live = !token.is_cancelled();
                token.cancel();
                if live {
                    trace!(role = self.role, "timer cancelled");
                }
                live
            }
            None => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
