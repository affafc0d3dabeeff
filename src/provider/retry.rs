//! Reusable retry policy for outbound provider calls.
//!
//! One policy object (max attempts, backoff function, retriable predicate)
//! is injected into every call site instead of hand-rolled retry loops.

use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential-backoff retry policy with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first try.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the retry following attempt number `attempt` (0-based),
    /// with 0-25% jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(max_ms);
        let jitter = if delay_ms > 0 {
            fastrand::u64(0..=delay_ms / 4)
        } else {
            0
        };
        Duration::from_millis(delay_ms.saturating_add(jitter))
    }

    /// Run `operation_fn` until it succeeds, fails non-retriably, or the
    /// attempt budget is exhausted. The last error is returned on
    /// exhaustion.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        operation: &str,
        is_retriable: P,
        operation_fn: F,
    ) -> std::result::Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match operation_fn().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !is_retriable(&e) || attempt + 1 >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        target: "saucier::provider",
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying provider call after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
