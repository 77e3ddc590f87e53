//! Unified retry policy for channel sends and datasource calls.
//!
//! Generalizes the teacher's `infrastructure::claude::retry::RetryPolicy`
//! (exponential backoff, classifier-driven) into the single retry policy
//! value described by spec.md §9: "Ad-hoc retry/backoff sprinkled through
//! drivers: unify under one retry policy value `{maxRetries, initialDelay,
//! factor, maxDelay, retriableClassifier}` injected into each driver."

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::models::config::RetryConfig;

/// `{maxRetries, initialDelay, factor, maxDelay, retriableClassifier}`.
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub factor: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_backoff_ms: cfg.initial_backoff_ms,
            max_backoff_ms: cfg.max_backoff_ms,
            factor: 2.0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, initial_backoff_ms: 1_000, max_backoff_ms: 60_000, factor: 2.0 }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64, factor: f64) -> Self {
        Self { max_retries, initial_backoff_ms, max_backoff_ms, factor }
    }

    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64 * self.factor.powi(attempt as i32))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(backoff_ms as u64)
    }

    /// Execute `operation`, retrying while `is_retriable` returns true and
    /// attempts remain. `is_retriable` is the classifier named in spec §9.
    pub async fn execute<F, Fut, T, E>(
        &self,
        mut operation: F,
        is_retriable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if attempt >= self.max_retries || !is_retriable(&err) {
                        return Err(err);
                    }
                    let backoff = self.calculate_backoff(attempt);
                    warn!(attempt = attempt + 1, max_retries = self.max_retries, ?backoff, %err, "retrying after transient error");
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
