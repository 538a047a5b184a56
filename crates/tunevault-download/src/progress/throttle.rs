//! Rate-limiter for progress notifications.
//!
//! Transfers report progress per received chunk, which is far more often
//! than a UI wants to repaint. Each download record carries one of these
//! and only forwards a notification when the interval has elapsed.

use std::time::{Duration, Instant};

/// Per-record rate-limiter for progress notifications.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_allowed: Option<Instant>,
}

impl ProgressThrottle {
    /// Create a throttle with the given minimum interval between emissions.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_allowed: None,
        }
    }

    /// Whether a notification may go out now. The first call always allows.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last_allowed {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_allowed = Some(now);
                true
            }
        }
    }

    /// Let the next call through regardless of elapsed time.
    ///
    /// Used when a transfer reaches a boundary (pause, completion) so the
    /// final progress figure is never swallowed.
    pub const fn force_next(&mut self) {
        self.last_allowed = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
