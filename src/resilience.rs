// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconnect policy for database links.
//!
//! A link that loses its server reconnects without giving up: the prefetcher
//! is useless without a connection, and the replica it is attached to will
//! come back. [`RetryConfig::reconnect()`] is that policy (fixed one-second
//! pause, unbounded attempts). Tests use [`RetryConfig::testing()`].

use std::time::Duration;

/// Configuration for connection retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of connection attempts.
    /// `usize::MAX` retries forever.
    pub max_attempts: usize,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failure (1.0 = fixed).
    pub backoff_factor: f64,

    /// Timeout for each individual connection attempt.
    pub connection_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::reconnect(Duration::from_secs(1))
    }
}

impl RetryConfig {
    /// Fixed-delay, never-give-up reconnect loop.
    pub fn reconnect(delay: Duration) -> Self {
        Self {
            max_attempts: usize::MAX,
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            connection_timeout: Duration::from_millis(500),
        }
    }

    /// Whether attempt number `attempt` (1-indexed) may be made.
    pub fn allows_attempt(&self, attempt: usize) -> bool {
        attempt <= self.max_attempts
    }

    /// Calculate delay after a failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self.backoff_factor.powi((attempt - 1).min(i32::MAX as usize) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        std::cmp::min(Duration::from_secs_f64(delay_secs), self.max_delay)
    }
}
