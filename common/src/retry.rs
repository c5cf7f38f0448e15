// Retry strategy used by the database client when establishing connections
// Linear retry: a fixed delay between a bounded number of attempts, no backoff growth

use std::time::Duration;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Calculate the delay to wait after the failed attempt `attempt` (zero-based)
    /// Returns None if no further attempt is allowed
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Total number of attempts this strategy permits
    fn max_attempts(&self) -> u32;

    /// Check if another attempt may follow the failed attempt `attempt`
    fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts()
    }
}

/// Fixed delay retry strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDelay {
    attempts: u32,
    delay: Duration,
}

impl FixedDelay {
    /// `attempts` is the total number of tries; zero is treated as one so a caller always
    /// gets at least a single attempt
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.should_retry(attempt) {
            Some(self.delay)
        } else {
            None
        }
    }

    fn max_attempts(&self) -> u32 {
        self.attempts
    }
}
