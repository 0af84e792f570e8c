// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Weak;
use std::time::Duration;

use tokio::time::Instant;

use super::Shared;
use crate::timer::TimerSlot;

/// Arm the one-shot retry for `generation`. Re-arming replaces a pending
/// retry, so at most one is ever outstanding.
pub(super) fn schedule(slot: &mut TimerSlot, shared: Weak<Shared>, generation: u64, delay: Duration) {
    let deadline = Instant::now() + delay;
    slot.arm(move || async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(shared) = shared.upgrade() {
            shared.core.lock().reconnect_due(generation);
        }
    });
}
