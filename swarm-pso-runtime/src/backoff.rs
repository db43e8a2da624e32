//! Jittered exponential backoff
//!
//! Workers back off between polls when the coordinator has nothing for them
//! and when the transport fails. Every delay lands inside `[min, max]`, and
//! jitter spreads retries so a fleet of workers does not poll in lockstep.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bounds for backoff delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// Policy bounded by `[min, max]`; the bounds are swapped if reversed
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// `min * 2^attempt`, capped at `max`
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min.saturating_mul(factor).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(5),
            max: Duration::from_secs(30),
        }
    }
}

/// Backoff state for one worker
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter, for tests and replays
    pub fn with_seed(policy: BackoffPolicy, seed: u64) -> Self {
        Self {
            policy,
            attempt: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Consecutive delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Next delay.
    ///
    /// A coordinator hint replaces the exponential target; either way the
    /// target is clamped into the policy range and the delay is drawn from
    /// `[max(target / 2, min), target]`.
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let BackoffPolicy { min, max } = self.policy;
        let target = match hint {
            Some(h) => h.max(min).min(max),
            None => self.policy.ceiling(self.attempt),
        };
        if self.attempt < 32 {
            self.attempt += 1;
        }

        let low = (target / 2).max(min);
        let low_ms = duration_ms(low);
        let high_ms = duration_ms(target);
        if high_ms <= low_ms {
            return target;
        }
        Duration::from_millis(self.rng.gen_range(low_ms..=high_ms))
    }

    /// Back to the minimum after a successful exchange
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
