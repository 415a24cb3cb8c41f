use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStrategy {
    ExponentialBackoff,
    LinearBackoff,
    FixedDelay,
}

/// How many times a hit is re-sent before it falls back to the offline queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of network attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            strategy: RetryStrategy::ExponentialBackoff,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// One attempt, no waiting. Failures go straight to storage.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            strategy: RetryStrategy::FixedDelay,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone)]
struct RetryState {
    attempts: u32,
    started_at: Instant,
}

/// Per-hit attempt bookkeeping, keyed by hit URL.
#[derive(Debug)]
pub struct RetryManager {
    config: RetryConfig,
    states: HashMap<String, RetryState>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn start_retry(&mut self, hit_id: &str) {
        self.states.insert(
            hit_id.to_string(),
            RetryState {
                attempts: 0,
                started_at: Instant::now(),
            },
        );
    }

    /// Records a failed attempt and returns how long to wait before the next
    /// one, or `None` once the attempts are used up.
    pub fn record_failure(&mut self, hit_id: &str) -> Option<Duration> {
        let attempts = {
            let state = self.states.entry(hit_id.to_string()).or_insert_with(|| RetryState {
                attempts: 0,
                started_at: Instant::now(),
            });
            state.attempts += 1;
            state.attempts
        };

        if attempts >= self.config.max_attempts {
            None
        } else {
            Some(self.calculate_delay(attempts - 1))
        }
    }

    pub fn get_attempt_count(&self, hit_id: &str) -> u32 {
        self.states.get(hit_id).map_or(0, |state| state.attempts)
    }

    /// Time spent on a hit since its first attempt.
    pub fn elapsed(&self, hit_id: &str) -> Option<Duration> {
        self.states.get(hit_id).map(|state| state.started_at.elapsed())
    }

    pub fn remove_retry(&mut self, hit_id: &str) {
        self.states.remove(hit_id);
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_millis = self.config.base_delay.as_millis() as u64;
        let delay = match self.config.strategy {
            RetryStrategy::ExponentialBackoff => {
                Duration::from_millis(base_millis.saturating_mul(2_u64.saturating_pow(attempt)))
            }
            RetryStrategy::LinearBackoff => {
                Duration::from_millis(base_millis.saturating_mul(attempt as u64 + 1))
            }
            RetryStrategy::FixedDelay => self.config.base_delay,
        };

        let capped = delay.min(self.config.max_delay);
        if self.config.jitter {
            apply_jitter(capped)
        } else {
            capped
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.5..1.5);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
