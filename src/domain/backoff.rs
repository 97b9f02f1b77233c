//! Capped exponential reconnect backoff.
//!
//! The n-th consecutive failure waits `base * multiplier^(n-1)`, capped
//! at `max`. Retries never stop; the cap only bounds the wait.

use std::time::Duration;

/// Reconnect delay policy for the live feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
}

impl Default for ReconnectBackoff {
    /// 1 s base, ×1.5 per attempt, 30 s cap.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1_000),
            max: Duration::from_millis(30_000),
            multiplier: 1.5,
        }
    }
}

impl ReconnectBackoff {
    /// Create a policy with the default 1.5 multiplier.
    ///
    /// `max` is raised to `base` if it is smaller.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            multiplier: 1.5,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    ///
    /// Attempt 0 is treated as the first attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.base.as_millis() as f64;
        let scaled = base_ms * self.multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let max_ms = self.max.as_millis() as f64;

        if !scaled.is_finite() || scaled >= max_ms {
            return self.max;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(scaled.round() as u64)
    }
}
