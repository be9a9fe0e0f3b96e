//! Job retry policy
//!
//! A discovery job is attempted up to `max_attempts` times with exponential
//! backoff between attempts: 1s, 2s, 4s with the default settings.

use crate::config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// Describes attempt `number` (1-based) under this policy
    pub fn attempt(&self, number: u32) -> Attempt {
        let number = number.max(1);
        Attempt {
            number,
            max_attempts: self.max_attempts,
            next_delay: self.backoff_after(number),
        }
    }

    pub fn first_attempt(&self) -> Attempt {
        self.attempt(1)
    }

    /// Delay between attempt `number` and the one after it
    fn backoff_after(&self, number: u32) -> Duration {
        let factor = 1u32.checked_shl(number - 1).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// One attempt of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    pub max_attempts: u32,
    /// Backoff before the next attempt if this one fails
    pub next_delay: Duration,
}

impl Attempt {
    /// Returns true if no retry follows this attempt
    pub fn is_final(&self) -> bool {
        self.number >= self.max_attempts
    }

    /// The following attempt, or `None` if this one is final
    pub fn next(&self) -> Option<Attempt> {
        if self.is_final() {
            return None;
        }

        Some(Attempt {
            number: self.number + 1,
            max_attempts: self.max_attempts,
            next_delay: self.next_delay.saturating_mul(2),
        })
    }
}
