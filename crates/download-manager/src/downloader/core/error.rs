//! Error types for the download manager with context and recovery information

use std::path::PathBuf;
use thiserror::Error;

/// Every way a download can fail
///
/// Failures never escape the manager as panics: each one is rendered into the
/// reason string of a `Failed` event, and the structured variant is what
/// synchronous callers (e.g. `add_download`) get back.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Malformed or unusable request, rejected before it is queued
    #[error("Invalid download request for '{url}': {reason}")]
    InvalidRequest {
        url: String,
        reason: String,
    },

    /// Transport-level failure (DNS, refused or reset connection, TLS)
    #[error("Network error: {reason}")]
    Network {
        url: String,
        reason: String,
    },

    /// Definitive server response with status >= 400
    #[error("HTTP error {status}: {reason}")]
    Http {
        url: String,
        status: u16,
        reason: String,
    },

    /// The hard per-request deadline elapsed
    #[error("Request to '{url}' timed out after {duration_secs}s")]
    Timeout {
        url: String,
        duration_secs: u64,
    },

    /// Transient failures kept failing until the retry budget ran out
    #[error("Network error after {retries} retries: {last_error}")]
    RetriesExhausted {
        url: String,
        retries: u32,
        last_error: String,
    },

    /// Disk failure while staging or committing a file
    #[error("Failed {operation} '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// Server announced a body but none arrived
    #[error("Refusing to write empty file '{path}': server declared {declared} bytes but sent none")]
    EmptyBody {
        path: PathBuf,
        declared: u64,
    },

    /// Transfer was aborted by shutdown
    #[error("Download of '{url}' was cancelled")]
    Cancelled {
        url: String,
    },

    /// Invalid configuration values
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Create,
    Write,
    Sync,
    Commit,
    Metadata,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Create => write!(f, "creating temporary file for"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Sync => write!(f, "syncing"),
            FileOperation::Commit => write!(f, "committing"),
            FileOperation::Metadata => write!(f, "reading metadata of"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Whether the retry policy may try the request again
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DownloadError::Network { .. } | DownloadError::Timeout { .. })
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::InvalidRequest { .. } => "invalid_request",
            DownloadError::Network { .. } => "network",
            DownloadError::Http { .. } => "http",
            DownloadError::Timeout { .. } => "timeout",
            DownloadError::RetriesExhausted { .. } => "retries_exhausted",
            DownloadError::FileSystem { .. } => "write",
            DownloadError::EmptyBody { .. } => "write",
            DownloadError::Cancelled { .. } => "cancelled",
            DownloadError::Configuration { .. } => "configuration",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DownloadError::Network { .. } | DownloadError::Timeout { .. } => ErrorSeverity::Medium,
            DownloadError::Http { .. } => ErrorSeverity::Medium,
            DownloadError::RetriesExhausted { .. } => ErrorSeverity::High,
            DownloadError::InvalidRequest { .. } => ErrorSeverity::High,
            DownloadError::EmptyBody { .. } => ErrorSeverity::High,
            DownloadError::Configuration { .. } => ErrorSeverity::High,
            DownloadError::FileSystem { .. } => ErrorSeverity::Critical,
            DownloadError::Cancelled { .. } => ErrorSeverity::Low,
        }
    }

    pub(crate) fn invalid_request<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        DownloadError::InvalidRequest {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn file_system<P: Into<PathBuf>>(
        path: P,
        operation: FileOperation,
        source: std::io::Error,
    ) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<url::ParseError> for DownloadError {
    fn from(error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::EmptyHost => "URL must have a valid hostname",
            url::ParseError::InvalidPort => "port number must be between 1 and 65535",
            url::ParseError::RelativeUrlWithoutBase => "URL must be absolute (include http:// or https://)",
            _ => "check the URL format",
        };

        DownloadError::InvalidRequest {
            url: "<unparseable>".to_string(),
            reason: format!("{error} ({suggestion})"),
        }
    }
}

/// Render an error together with its `source()` chain on one line
///
/// reqwest keeps the interesting part ("connection refused", certificate
/// problems) in nested sources, so the top-level message alone is useless.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
