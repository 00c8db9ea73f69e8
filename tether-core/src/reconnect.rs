// ABOUTME: Linear backoff for reconnecting the session channel after unexpected closes.
// ABOUTME: Attempt n waits n * base_delay; gives up after max_attempts without a successful open.

use std::time::Duration;

/// Backoff configuration for channel reconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay unit; attempt n waits n times this
    pub base_delay: Duration,
    /// Attempts allowed between successful opens
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

/// Tracks reconnection attempts since the last successful open.
///
/// Only a successful open resets the counter. Receiving frames does not.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    attempt: u32,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Record a successful open (restores the full attempt budget)
    pub fn record_open(&mut self) {
        self.attempt = 0;
    }

    /// Record an unexpected close and return the delay before the next attempt,
    /// or None once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.config.base_delay * self.attempt)
    }

    /// Attempts made since the last successful open
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether no further attempts will be scheduled
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
