//! # Fibonacci Backoff
//!
//! Progressive retry delays following the Fibonacci sequence, capped.
//!
//! With `min = 1s` the sequence is 1s, 1s, 2s, 3s, 5s, 8s, ... up to `max`.

use std::time::Duration;

/// Smallest first delay; a zero minimum would never grow
pub const MIN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    previous: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// `min` is raised to [`MIN_BACKOFF`] and `max` to `min` if smaller
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(MIN_BACKOFF);
        let max = max.max(min);
        Self {
            min,
            max,
            previous: Duration::ZERO,
            current: min,
        }
    }

    /// Returns the current delay and advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        let next = self.previous.saturating_add(self.current).min(self.max);
        self.previous = self.current;
        self.current = next;
        delay
    }
}
