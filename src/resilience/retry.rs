// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Provides configurable retry behavior for transient failures, plus a
//! fetch-specific variant that honours upstream rate limit advice.
//!
//! # Example
//!
//! ```
//! use reconcile_engine::RetryConfig;
//!
//! // Startup: fail fast on bad config
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! // Daemon: never give up on reconnection
//! let daemon = RetryConfig::daemon();
//! assert_eq!(daemon.max_retries, None); // Infinite
//!
//! // Query: quick retry, then fail
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use super::backoff::parse_wait_with;
use crate::config::ReconcileConfig;
use crate::upstream::FetchError;

/// Configuration for connection/operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::startup()`] - Fast-fail for initial connections
/// - [`RetryConfig::daemon()`] - Infinite retry for runtime reconnection
/// - [`RetryConfig::query()`] - Quick retry for individual operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::daemon()
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial startup connection.
    /// Attempts 5 times with exponential backoff, failing after ~5 seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Infinite retry for long-running daemon (never give up!).
    /// Retries forever with exponential backoff capped at 5 minutes.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            max_retries: None, // Infinite
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // Cap at 5 minutes
            factor: 2.0,
        }
    }

    /// Quick retry for individual queries (don't block forever).
    /// 3 attempts with fast backoff - if it fails, let caller handle it.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_retries {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    ),
                    None => warn!(
                        "Operation '{}' failed (attempt {}, will retry forever): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    ),
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Retry an upstream fetch.
///
/// Transport errors back off exponentially per `config`. Rate limit errors
/// sleep for the wait advertised in their message (plus the configured
/// buffer) and do not advance the exponential delay. Non-retryable errors
/// return immediately.
pub async fn retry_fetch<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    settings: &ReconcileConfig,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Fetch '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                attempts += 1;
                if config.max_retries.is_some_and(|max| attempts >= max) {
                    return Err(err);
                }

                let wait = match &err {
                    FetchError::RateLimited { message } => parse_wait_with(
                        message,
                        settings.rate_limit_buffer(),
                        settings.rate_limit_default_wait(),
                    ),
                    _ => {
                        let current = delay;
                        delay = config.next_delay(delay);
                        current
                    }
                };

                crate::metrics::record_fetch_retry(operation_name, &err);
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    error = %err,
                    wait_ms = wait.as_millis() as u64,
                    "Fetch failed, backing off"
                );
                sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || async { Ok(42) },
        ).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
        ).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            },
        ).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().0.contains("always fail"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::startup().max_retries, Some(5));
        assert!(RetryConfig::daemon().max_retries.is_none());
        assert_eq!(RetryConfig::query().max_retries, Some(3));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0,
            max_retries: Some(5),
        };
        assert_eq!(config.next_delay(config.initial_delay), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fetch_waits_advertised_rate_limit() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let started = tokio::time::Instant::now();

        let result = retry_fetch(
            "page_1",
            &RetryConfig::test(),
            &ReconcileConfig::default(),
            || {
                let a = attempts_clone.clone();
                async move {
                    if a.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FetchError::RateLimited {
                            message: "Rate limit is exceeded. Try again in 10 seconds.".into(),
                        })
                    } else {
                        Ok("page")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // 10s advertised + 5s buffer, on the paused clock
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_retry_fetch_does_not_retry_cancellation() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), FetchError> = retry_fetch(
            "page_1",
            &RetryConfig::test(),
            &ReconcileConfig::default(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Cancelled)
                }
            },
        )
        .await;

        assert_eq!(result, Err(FetchError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_fetch_gives_up_on_transport_errors() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), FetchError> = retry_fetch(
            "page_1",
            &RetryConfig::test(),
            &ReconcileConfig::default(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Transport("connection reset".into()))
                }
            },
        )
        .await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
