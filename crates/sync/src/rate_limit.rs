//! Rate limiting for both external systems.
//!
//! Three mechanisms, one per provider limit:
//!
//! - [`CostBudget`] reads the query-cost throttle status returned with every
//!   query-document response and computes how long to pause before the next
//!   call so the budget stays above a floor.
//! - [`RetryPolicy`] is a bounded retry loop for "too many requests"
//!   responses. It sleeps for the server's `Retry-After` (or a default) and
//!   gives up with [`RetriesExhausted`] once the retry budget is spent.
//! - [`WritePacer`] spaces out target-workspace writes, which have a lower
//!   ceiling (about three requests per second) than the source.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use thiserror::Error;

use crate::config::SyncTuning;

// =============================================================================
// Cost-based throttling
// =============================================================================

/// Query cost and throttle status reported with a query-document response.
///
/// Deserializes from the `extensions.cost` object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBudget {
    /// Points the query was estimated to cost.
    #[serde(default)]
    pub requested_query_cost: Option<f64>,
    /// Points the query actually cost.
    #[serde(default)]
    pub actual_query_cost: Option<f64>,
    /// Bucket status after the query ran.
    pub throttle_status: ThrottleStatus,
}

/// Leaky-bucket state of the cost budget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    /// Bucket size.
    pub maximum_available: f64,
    /// Points available right now.
    pub currently_available: f64,
    /// Points restored per second.
    pub restore_rate: f64,
}

impl CostBudget {
    /// Pause needed before the next call, if the budget is under `floor`.
    ///
    /// The pause is the time to restore the shortfall at the reported restore
    /// rate, never less than `min_delay`.
    #[must_use]
    pub fn throttle_delay(&self, floor: f64, min_delay: Duration) -> Option<Duration> {
        let status = &self.throttle_status;
        if status.currently_available >= floor {
            return None;
        }
        if status.restore_rate <= 0.0 {
            return Some(min_delay);
        }

        let wait_ms = (floor - status.currently_available) / status.restore_rate * 1000.0;
        let wait = Duration::try_from_secs_f64(wait_ms / 1000.0).unwrap_or(min_delay);
        Some(wait.max(min_delay))
    }
}

// =============================================================================
// Status-based retry
// =============================================================================

/// Outcome of one attempt inside a [`RetryPolicy`] loop.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The call went through.
    Done(T),
    /// The provider asked us to slow down.
    RateLimited {
        /// Server-suggested wait, if any.
        retry_after: Option<Duration>,
    },
}

/// Raised when a call is still rate limited after the whole retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limited after {attempts} attempts ({}ms spent waiting)", .waited.as_millis())]
pub struct RetriesExhausted {
    /// Total attempts made, including the first.
    pub attempts: u32,
    /// Sum of all waits between attempts.
    pub waited: Duration,
}

/// Bounded retry loop for rate-limited calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait used when the response has no `Retry-After`.
    pub default_retry_after: Duration,
}

impl RetryPolicy {
    /// Build the policy from the tuning knobs.
    #[must_use]
    pub const fn from_tuning(tuning: &SyncTuning) -> Self {
        Self {
            max_retries: tuning.max_retries,
            default_retry_after: tuning.default_retry_after,
        }
    }

    /// Run `operation` until it completes, fails, or exhausts the retry budget.
    ///
    /// Errors from the operation itself propagate immediately; only
    /// [`Attempt::RateLimited`] is retried.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or `RetriesExhausted` converted into `E`
    /// after `max_retries` rate-limited retries.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, E>>,
        E: From<RetriesExhausted>,
    {
        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            attempts += 1;
            match operation().await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::RateLimited { retry_after } => {
                    if attempts > self.max_retries {
                        tracing::error!(label, attempts, "Rate limit retries exhausted");
                        return Err(RetriesExhausted { attempts, waited }.into());
                    }
                    let delay = retry_after.unwrap_or(self.default_retry_after);
                    tracing::warn!(
                        label,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }
}

/// Read a `Retry-After` header given in (possibly fractional) seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

// =============================================================================
// Write pacing
// =============================================================================

/// Enforces a minimum spacing between target-workspace writes.
///
/// A zero spacing disables pacing entirely.
#[derive(Clone)]
pub struct WritePacer {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl WritePacer {
    /// Allow one write per `spacing`.
    #[must_use]
    pub fn new(spacing: Duration) -> Self {
        let limiter = Quota::with_period(spacing).map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { limiter }
    }

    /// Wait until the next write is allowed.
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for WritePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePacer")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use reqwest::header::HeaderValue;

    fn budget(available: f64, restore_rate: f64) -> CostBudget {
        CostBudget {
            requested_query_cost: Some(52.0),
            actual_query_cost: Some(12.0),
            throttle_status: ThrottleStatus {
                maximum_available: 2000.0,
                currently_available: available,
                restore_rate,
            },
        }
    }

    #[test]
    fn test_throttle_delay_restores_shortfall() {
        let delay = budget(100.0, 50.0).throttle_delay(500.0, Duration::from_millis(100));
        assert_eq!(delay, Some(Duration::from_millis(8000)));
    }

    #[test]
    fn test_throttle_delay_respects_minimum() {
        let delay = budget(499.0, 100.0).throttle_delay(500.0, Duration::from_millis(100));
        assert_eq!(delay, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_no_delay_above_floor() {
        assert_eq!(
            budget(1500.0, 50.0).throttle_delay(500.0, Duration::from_millis(100)),
            None
        );
    }

    #[test]
    fn test_cost_budget_deserializes_extensions() {
        let json = serde_json::json!({
            "requestedQueryCost": 52,
            "actualQueryCost": 12,
            "throttleStatus": {
                "maximumAvailable": 2000.0,
                "currentlyAvailable": 1988,
                "restoreRate": 100.0
            }
        });
        let cost: CostBudget = serde_json::from_value(json).unwrap();
        assert!((cost.throttle_status.currently_available - 1988.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("2.0"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));
    }

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Exhausted(RetriesExhausted),
        Fatal,
    }

    impl From<RetriesExhausted> for TestError {
        fn from(e: RetriesExhausted) -> Self {
            Self::Exhausted(e)
        }
    }

    const IMMEDIATE: RetryPolicy = RetryPolicy {
        max_retries: 3,
        default_retry_after: Duration::ZERO,
    };

    #[tokio::test]
    async fn test_retry_succeeds_after_rate_limits() {
        let mut calls = 0u32;
        let result: Result<&str, TestError> = IMMEDIATE
            .run("test", || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Ok(Attempt::RateLimited { retry_after: None })
                    } else {
                        Ok(Attempt::Done("ok"))
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut calls = 0u32;
        let result: Result<(), TestError> = IMMEDIATE
            .run("test", || {
                calls += 1;
                async { Ok(Attempt::RateLimited { retry_after: None }) }
            })
            .await;

        assert_eq!(
            result,
            Err(TestError::Exhausted(RetriesExhausted {
                attempts: 4,
                waited: Duration::ZERO,
            }))
        );
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let mut calls = 0u32;
        let result: Result<(), TestError> = IMMEDIATE
            .run("test", || {
                calls += 1;
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_zero_spacing_pacer_never_blocks() {
        let pacer = WritePacer::new(Duration::ZERO);
        for _ in 0..10 {
            pacer.wait().await;
        }
    }
}
