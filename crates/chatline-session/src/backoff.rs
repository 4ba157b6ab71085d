//! Exponential backoff delays for reconnects and send retries.

use std::time::Duration;

/// Exponential backoff: `base * 2^min(attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base: Duration, cap: u32) -> Self {
        Self { base, cap }
    }

    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub const fn cap(&self) -> u32 {
        self.cap
    }

    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(self.cap).min(31);
        self.base.saturating_mul(1_u32 << shift)
    }

    /// Upper bound of every delay this policy yields.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.delay_for_attempt(self.cap)
    }
}
