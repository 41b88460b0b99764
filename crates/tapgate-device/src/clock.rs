//! Millisecond tick clock shared by the controller and its inputs.
//!
//! Gesture timestamps, coalescing windows and announce retries all
//! compare plain `u64` milliseconds measured from one epoch. The clock
//! is built on the tokio instant so paused-time tests drive every
//! window deterministically with `tokio::time::advance`.

use tokio::time::Instant;

/// Monotonic milliseconds since the clock was created.
///
/// Cloning is cheap and every clone shares the same epoch, so the
/// controller, the button interrupt and test harnesses all agree on
/// what "now" means.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Create a clock with its epoch at the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
