//! Reconnection backoff policy

use std::time::Duration;

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry, and the floor for every retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Growth factor per failed attempt (1 keeps a fixed interval)
    pub multiplier: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl ReconnectConfig {
    /// Fixed-interval retry
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }
}

/// Bounded exponential backoff, reset after every successful connect
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;

        let ceiling = self.config.max_delay.max(self.config.initial_delay);
        let delay = self.current_delay.clamp(self.config.initial_delay, ceiling);

        self.current_delay = delay
            .checked_mul(self.config.multiplier.max(1))
            .unwrap_or(ceiling)
            .min(ceiling);

        delay
    }

    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
