// Retry policy for command sends (fixed delay) and reconnects (linear backoff).

use std::time::Duration;

use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Send attempts per command, and reconnect attempts per drop.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Total send attempts for one command; always at least one.
    pub fn send_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause between two send attempts.
    pub fn send_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before reconnect attempt `attempt` (1-based): `base_delay * attempt`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }

    /// Whether another reconnect may be scheduled after `attempts_made`.
    pub fn allows_reconnect(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
