//! Retry decisions and linear backoff

use std::time::Duration;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{DownloadRequest, TransferOutcome};

/// Decides whether a failed attempt is tried again, and when
///
/// Only transport failures and timeouts are retried. An HTTP error status is
/// the server's final word and a cancellation is deliberate, so neither is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay_step: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay_step: Duration) -> Self {
        Self { max_retries, delay_step }
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay_step)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether `request` should be attempted again after `outcome`
    pub fn should_retry(&self, request: &DownloadRequest, outcome: &TransferOutcome) -> bool {
        outcome.is_transient() && request.retry_count < self.max_retries
    }

    /// Delay before requeueing a request whose retry count is now `retry_count`
    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.delay_step.saturating_mul(retry_count)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DownloadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_retries(retry_count: u32) -> DownloadRequest {
        let mut request = DownloadRequest::new(
            "https://x/file.zip",
            &std::env::temp_dir().join("file.zip"),
            None,
        )
        .unwrap();
        request.retry_count = retry_count;
        request
    }

    #[test]
    fn test_transient_failures_are_retried_until_budget_spent() {
        let policy = RetryPolicy::default();
        let network = TransferOutcome::NetworkError("connection refused".into());
        let timeout = TransferOutcome::TimedOut(Duration::from_secs(12));

        for retries in 0..3 {
            assert!(policy.should_retry(&request_with_retries(retries), &network));
            assert!(policy.should_retry(&request_with_retries(retries), &timeout));
        }
        assert!(!policy.should_retry(&request_with_retries(3), &network));
        assert!(!policy.should_retry(&request_with_retries(3), &timeout));
    }

    #[test]
    fn test_definitive_outcomes_are_never_retried() {
        let policy = RetryPolicy::default();
        let fresh = request_with_retries(0);

        for status in [400, 404, 429, 500, 503] {
            let outcome = TransferOutcome::HttpError { status, reason: "nope".into() };
            assert!(!policy.should_retry(&fresh, &outcome), "status {status} must not retry");
        }
        assert!(!policy.should_retry(&fresh, &TransferOutcome::Cancelled));
        assert!(!policy.should_retry(
            &fresh,
            &TransferOutcome::Success { body: vec![], declared_len: None }
        ));
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
    }

    #[test]
    fn test_zero_retry_budget() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let network = TransferOutcome::NetworkError("reset".into());
        assert!(!policy.should_retry(&request_with_retries(0), &network));
    }
}
