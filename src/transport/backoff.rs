//! Reconnection delay policy.
//!
//! Delays grow linearly with the attempt number and are capped:
//!
//! ```text
//! attempt:  1   2   3   4   5   6 ...
//! delay:    1s  2s  3s  4s  5s  5s
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on the reconnection delay.
pub const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_secs(5);

// ============================================================================
// Backoff
// ============================================================================

/// Linear-to-capped reconnection backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay for attempt 1, and the step added per attempt.
    pub initial: Duration,
    /// Upper bound.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY_MAX)
    }
}

impl Backoff {
    /// Creates a policy. A `max` below `initial` is raised to `initial`.
    #[inline]
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before the given attempt. Attempt 0 has no delay.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.initial
            .checked_mul(attempt)
            .map_or(self.max, |d| d.min(self.max))
    }
}

// ============================================================================
// Tests
// ============================================================================
