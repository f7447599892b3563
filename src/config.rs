//! Configuration for the reconciliation engine.
//!
//! # Example
//!
//! ```
//! use reconcile_engine::ReconcileConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ReconcileConfig::default();
//! assert_eq!(config.page_size, 100);
//! assert!(config.delete_orphans);
//!
//! // Overrides
//! let config = ReconcileConfig {
//!     page_size: 250,
//!     delete_orphans: false,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::resilience::retry::RetryConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Configuration for a reconciliation run.
///
/// All fields have defaults, so a config file only needs the overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Records requested per upstream page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Remove local records that were not seen upstream (default: true).
    /// Even when enabled, cleanup only happens after a successful fetch.
    #[serde(default = "default_delete_orphans")]
    pub delete_orphans: bool,

    /// Seconds added to a server-advertised rate limit wait
    #[serde(default = "default_rate_limit_buffer_secs")]
    pub rate_limit_buffer_secs: u64,

    /// Wait used when a rate limit message carries no duration
    #[serde(default = "default_rate_limit_default_wait_secs")]
    pub rate_limit_default_wait_secs: u64,

    /// Attempts per page before the fetch phase gives up
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: usize,

    /// Transport error backoff
    #[serde(default = "default_fetch_initial_delay_ms")]
    pub fetch_initial_delay_ms: u64,
    #[serde(default = "default_fetch_max_delay_ms")]
    pub fetch_max_delay_ms: u64,
}

fn default_page_size() -> u32 { 100 }
fn default_delete_orphans() -> bool { true }
fn default_rate_limit_buffer_secs() -> u64 { 5 }
fn default_rate_limit_default_wait_secs() -> u64 { 60 }
fn default_fetch_max_retries() -> usize { 3 }
fn default_fetch_initial_delay_ms() -> u64 { 500 }
fn default_fetch_max_delay_ms() -> u64 { 30_000 }

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            delete_orphans: default_delete_orphans(),
            rate_limit_buffer_secs: default_rate_limit_buffer_secs(),
            rate_limit_default_wait_secs: default_rate_limit_default_wait_secs(),
            fetch_max_retries: default_fetch_max_retries(),
            fetch_initial_delay_ms: default_fetch_initial_delay_ms(),
            fetch_max_delay_ms: default_fetch_max_delay_ms(),
        }
    }
}

impl ReconcileConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError("page_size must be at least 1".into()));
        }
        if self.fetch_max_retries == 0 {
            return Err(ConfigError("fetch_max_retries must be at least 1".into()));
        }
        if self.fetch_initial_delay_ms > self.fetch_max_delay_ms {
            return Err(ConfigError(
                "fetch_initial_delay_ms must not exceed fetch_max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy applied to each page fetch.
    #[must_use]
    pub fn fetch_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.fetch_max_retries),
            initial_delay: Duration::from_millis(self.fetch_initial_delay_ms),
            max_delay: Duration::from_millis(self.fetch_max_delay_ms),
            factor: 2.0,
        }
    }

    #[must_use]
    pub fn rate_limit_buffer(&self) -> Duration {
        Duration::from_secs(self.rate_limit_buffer_secs)
    }

    #[must_use]
    pub fn rate_limit_default_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_default_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.page_size, 100);
        assert!(config.delete_orphans);
        assert_eq!(config.rate_limit_buffer(), Duration::from_secs(5));
        assert_eq!(config.rate_limit_default_wait(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ReconcileConfig =
            serde_json::from_str(r#"{"page_size": 25, "delete_orphans": false}"#).unwrap();
        assert_eq!(config.page_size, 25);
        assert!(!config.delete_orphans);
        assert_eq!(config.fetch_max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = ReconcileConfig { page_size: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = ReconcileConfig {
            fetch_initial_delay_ms: 10_000,
            fetch_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fetch_retry_policy() {
        let retry = ReconcileConfig::default().fetch_retry();
        assert_eq!(retry.max_retries, Some(3));
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }
}
