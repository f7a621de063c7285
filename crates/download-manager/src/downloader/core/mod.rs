//! Core types used throughout the download manager
//!
//! This module contains the fundamental types that all other modules depend on:
//! requests, transfer outcomes, errors, events and the I/O seams.

pub mod error;
pub mod files;
pub mod http;
pub mod metrics;
pub mod progress;

pub use error::{DownloadError, ErrorSeverity, FileOperation, Result};
pub use files::DurableWriter;
pub use http::{HttpTransport, Transport};
pub use metrics::{DownloadMetrics, DownloadMetricsSnapshot};
pub use progress::{
    CompositeEventSink, DownloadEvent, DownloadEvents, EventSink, FnEventSink, LoggingEventSink,
    NullEventSink,
};

use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// A validated request to fetch `url` into `destination`
///
/// Requests are plain values: the same URL may be queued several times, so
/// in-flight work is tracked by [`TransferId`] rather than by request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: Url,
    /// Absolute path the committed file will appear at
    pub destination: PathBuf,
    /// Number of retries already spent on this request
    pub retry_count: u32,
}

impl DownloadRequest {
    /// Validate `url` and resolve `destination`
    ///
    /// An empty destination is derived from the last path segment of the URL,
    /// placed under `default_dir`. Only absolute `http`/`https` URLs and
    /// absolute destinations are accepted.
    pub fn new(url: &str, destination: &Path, default_dir: Option<&Path>) -> Result<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(DownloadError::invalid_request(url, "URL is empty"));
        }

        let parsed = Url::parse(trimmed).map_err(|e| match DownloadError::from(e) {
            DownloadError::InvalidRequest { reason, .. } => DownloadError::invalid_request(url, reason),
            other => other,
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_request(
                url,
                format!("unsupported scheme '{}' (supported: http, https)", parsed.scheme()),
            ));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(DownloadError::invalid_request(url, "URL has no host"));
        }

        let destination = if destination.as_os_str().is_empty() {
            Self::derive_destination(&parsed, default_dir)?
        } else {
            destination.to_path_buf()
        };

        if !destination.is_absolute() {
            return Err(DownloadError::invalid_request(
                url,
                format!("destination '{}' is not an absolute path", destination.display()),
            ));
        }

        Ok(Self {
            url: parsed,
            destination,
            retry_count: 0,
        })
    }

    fn derive_destination(url: &Url, default_dir: Option<&Path>) -> Result<PathBuf> {
        let dir = default_dir.ok_or_else(|| {
            DownloadError::invalid_request(
                url.as_str(),
                "no destination given and no default download directory configured",
            )
        })?;

        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                DownloadError::invalid_request(url.as_str(), "cannot derive a filename from the URL")
            })?;

        Ok(dir.join(filename))
    }

    /// The same request, one retry further along
    pub(crate) fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}

/// Identity of one admitted transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub(crate) u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal result of a single transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Complete body, plus the Content-Length the server announced (if any)
    Success { body: Vec<u8>, declared_len: Option<u64> },
    /// Server answered with status >= 400
    HttpError { status: u16, reason: String },
    /// Transport failure before or during the body
    NetworkError(String),
    /// The per-request deadline elapsed
    TimedOut(Duration),
    /// Aborted by shutdown
    Cancelled,
}

impl TransferOutcome {
    /// Failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferOutcome::NetworkError(_) | TransferOutcome::TimedOut(_))
    }

    /// Convert a failed outcome into the matching error; `None` for success
    pub fn into_error(self, url: &Url) -> Option<DownloadError> {
        let url = url.to_string();
        match self {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::HttpError { status, reason } => Some(DownloadError::Http { url, status, reason }),
            TransferOutcome::NetworkError(reason) => Some(DownloadError::Network { url, reason }),
            TransferOutcome::TimedOut(limit) => Some(DownloadError::Timeout {
                url,
                duration_secs: limit.as_secs(),
            }),
            TransferOutcome::Cancelled => Some(DownloadError::Cancelled { url }),
        }
    }
}
