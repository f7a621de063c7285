//! Downloader module
//!
//! This module contains all the download functionality including
//! core types, configuration, scheduling and the public manager.

pub mod core;
pub mod config;
mod dispatcher;
pub mod freshness;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod worker;

// Re-export main types for convenience
pub use manager::DownloadManager;
pub use core::{
    DownloadRequest, TransferId, TransferOutcome,
    DownloadEvent, DownloadEvents, EventSink, FnEventSink,
    LoggingEventSink, NullEventSink, CompositeEventSink,
    DownloadMetrics, DownloadMetricsSnapshot,
    DurableWriter, HttpTransport, Transport,
    DownloadError, Result, ErrorSeverity, FileOperation,
};
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use freshness::Freshness;
pub use queue::RequestQueue;
pub use retry::RetryPolicy;
pub use worker::TransferWorker;
