// src/ingest/retry.rs
//! Reconnect policy for feed adapters: fixed base delay, doubling on each
//! consecutive failure up to a cap, one notification per failure streak.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failures before the streak is notified.
    pub notify_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
            notify_after: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStep {
    pub delay: Duration,
    pub notify: bool,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Call after a connection delivered data.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Delay after a normal end of stream.
    pub fn after_eof(&self) -> Duration {
        self.policy.base_delay
    }

    pub fn on_failure(&mut self) -> RetryStep {
        self.failures = self.failures.saturating_add(1);
        let shift = (self.failures - 1).min(16);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.policy.max_delay.max(self.policy.base_delay));
        RetryStep {
            delay,
            notify: self.policy.notify_after > 0 && self.failures == self.policy.notify_after,
        }
    }
}
