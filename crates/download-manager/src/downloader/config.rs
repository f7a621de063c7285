//! Configuration types for the download manager

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::core::{DownloadError, Result};

/// Desktop Firefox user agent sent with every request
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0";

/// Configuration for a [`DownloadManager`](crate::DownloadManager)
///
/// Passed in at construction; nothing is read from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Worker slot budget; values below 1 are treated as 1
    pub max_concurrent: usize,
    /// Hard deadline for one transfer attempt
    pub request_timeout: Duration,
    /// Retries allowed after the first attempt for transient failures
    pub max_retries: u32,
    /// Linear backoff unit: retry `n` waits `n * retry_delay_step`
    pub retry_delay_step: Duration,
    /// Minimum spacing between progress events for one transfer
    pub progress_interval: Duration,
    pub user_agent: String,
    /// Skip TLS certificate validation. Only for broken mirrors you trust.
    pub accept_invalid_certs: bool,
    /// Directory used when a request has an empty destination
    pub default_destination_dir: Option<PathBuf>,
}

impl DownloadConfig {
    /// Check values that cannot be sensibly clamped
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(DownloadError::Configuration {
                message: "request timeout must be greater than zero".to_string(),
                field: Some("request_timeout".to_string()),
            });
        }

        if let Some(dir) = &self.default_destination_dir {
            if !dir.is_absolute() {
                return Err(DownloadError::Configuration {
                    message: format!("default destination '{}' is not absolute", dir.display()),
                    field: Some("default_destination_dir".to_string()),
                });
            }
        }

        if self.user_agent.trim().is_empty() {
            return Err(DownloadError::Configuration {
                message: "user agent must not be empty".to_string(),
                field: Some("user_agent".to_string()),
            });
        }

        Ok(())
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            request_timeout: Duration::from_secs(12),
            max_retries: 3,
            retry_delay_step: Duration::from_millis(1000),
            progress_interval: Duration::from_millis(100),
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept_invalid_certs: false,
            default_destination_dir: None,
        }
    }
}

/// Fluent builder for [`DownloadConfig`]
#[derive(Debug, Clone, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_delay_step(mut self, step: Duration) -> Self {
        self.config.retry_delay_step = step;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = interval;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    pub fn default_destination_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.default_destination_dir = Some(dir.into());
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<DownloadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_step, Duration::from_secs(1));
        assert!(config.user_agent.contains("Firefox"));
        assert!(!config.accept_invalid_certs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let dir = std::env::temp_dir().join("addons");
        let config = DownloadConfigBuilder::new()
            .max_concurrent(2)
            .max_retries(5)
            .retry_delay_step(Duration::from_millis(10))
            .default_destination_dir(&dir)
            .build()
            .unwrap();

        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_step, Duration::from_millis(10));
        assert_eq!(config.default_destination_dir, Some(dir));
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let error = DownloadConfigBuilder::new()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(error, DownloadError::Configuration { field: Some(ref f), .. } if f == "request_timeout"));

        let error = DownloadConfigBuilder::new()
            .default_destination_dir("relative/addons")
            .build()
            .unwrap_err();
        assert!(error.to_string().contains("not absolute"));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: DownloadConfig =
            serde_json::from_str(r#"{ "max_concurrent": 8, "accept_invalid_certs": false }"#).unwrap();

        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }
}
