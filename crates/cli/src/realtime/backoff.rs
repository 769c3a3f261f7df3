// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect delays: exponential growth with a cap plus uniform jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RealtimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: Duration) -> Self {
        Backoff { initial, max, jitter }
    }

    /// Delay before retry `attempt` (1-based) without jitter:
    /// `initial * 2^(attempt-1)`, capped at `max`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay before retry `attempt`, with jitter drawn from `0..=jitter`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(extra)
    }
}

impl From<&RealtimeConfig> for Backoff {
    fn from(config: &RealtimeConfig) -> Self {
        Backoff::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.jitter_ms),
        )
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
