// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Weak;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::Shared;
use crate::timer::TimerSlot;

/// Arm the heartbeat for `generation`, replacing any previous one.
///
/// The first ping goes out one full `period` after the connection opens. The
/// task stops on its own once the session is gone or no longer connected on
/// that generation. A zero `period` disables the heartbeat.
pub(super) fn start(slot: &mut TimerSlot, shared: Weak<Shared>, generation: u64, period: Duration) {
    if period.is_zero() {
        slot.cancel();
        debug!(generation, "heartbeat disabled");
        return;
    }
    let first = Instant::now() + period;
    slot.arm(move || async move {
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let alive = shared.core.lock().beat(generation);
            if !alive {
                return;
            }
        }
    });
}
