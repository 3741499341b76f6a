//! Restart policy for failed connections.
//!
//! The policy is a pure decision: it never sleeps or touches a connection. The
//! connection feeds it the number of consecutive failures and acts on the
//! answer.

use std::time::Duration;

/// What a connection should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Wait, then initialize again.
    Retry {
        /// How long to wait before the next attempt.
        wait: Duration,
    },
    /// Stop trying; the connection is closed.
    GiveUp,
}

impl RestartDecision {
    /// Returns `true` for [`RestartDecision::Retry`].
    pub fn is_retry(self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Decides whether attempt number `attempt` may be followed by another one.
///
/// With `max_attempts = m`, attempts `0..m` retry and attempt `m` (or later)
/// gives up.
pub fn decide(attempt: u32, max_attempts: u32, delay: Duration) -> RestartDecision {
    if attempt < max_attempts {
        RestartDecision::Retry { wait: delay }
    } else {
        RestartDecision::GiveUp
    }
}

/// Restart ceiling and delay, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RestartPolicy {
    /// Creates a policy.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Maximum number of consecutive failures.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between a failure and the next initialization.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Decision after `failures` consecutive failures.
    pub fn decide(&self, failures: u32) -> RestartDecision {
        decide(failures, self.max_attempts, self.delay)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}
