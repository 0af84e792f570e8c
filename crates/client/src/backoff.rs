// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnection backoff policy.

use std::time::Duration;

/// Exponential retry policy: attempt `n` waits `base * 2^(n - 1)`, up to
/// `max_attempts` consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    /// Delay before attempt `attempt` (1-based). Attempt 0 has no delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(31);
        self.base.saturating_mul(factor)
    }

    /// Claim the next retry slot.
    ///
    /// Increments `attempts` and returns the delay for the claimed attempt, or
    /// `None` (leaving `attempts` untouched) once the budget is spent.
    pub fn next_attempt(&self, attempts: &mut u32) -> Option<Duration> {
        if *attempts >= self.max_attempts {
            return None;
        }
        *attempts += 1;
        Some(self.delay(*attempts))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
