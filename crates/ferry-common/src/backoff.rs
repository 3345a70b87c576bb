//! Per-object requeue backoff for controller error policies.
//!
//! Reconcilers never sleep and retry in place. A failed invocation returns
//! its error, and the controller's `error_policy` asks [`RequeueBackoff`] how
//! long to wait before the work queue re-invokes it. Consecutive failures of
//! the same object grow the delay exponentially with jitter; a success
//! resets it.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tracing::debug;

use crate::Error;

/// Configuration for exponential requeue delays.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay for the given 1-based failure count, before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Tracks consecutive failures per object key.
#[derive(Debug, Default)]
pub struct RequeueBackoff {
    config: BackoffConfig,
    attempts: DashMap<String, u32>,
}

impl RequeueBackoff {
    /// Create a tracker with the given configuration
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return the delay before the next attempt
    ///
    /// Errors that carry their own requeue hint use it verbatim. Errors that
    /// cannot succeed without a spec change wait the maximum delay.
    pub fn next_delay(&self, key: &str, error: &Error) -> Duration {
        let attempt = {
            let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
            let next = entry.saturating_add(1);
            *entry = next;
            next
        };

        if let Some(hint) = error.requeue_hint() {
            debug!(key, attempt, delay_secs = hint.as_secs(), "using error requeue hint");
            return hint;
        }
        if !error.is_retryable() {
            return self.config.max_delay;
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let base = self.config.delay_for_attempt(attempt);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = Duration::from_secs_f64(base.as_secs_f64() * jitter).min(self.config.max_delay);
        debug!(key, attempt, delay_ms = delay.as_millis() as u64, "requeue after failure");
        delay
    }

    /// Forget failures for `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).map(|a| *a).unwrap_or(0)
    }
}
