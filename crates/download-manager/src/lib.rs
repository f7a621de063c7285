//! Download Manager Library
//!
//! This library provides a queued, concurrency-limited HTTP(S) downloader.
//! Requests wait in a FIFO queue, run in a bounded number of parallel
//! transfers, are retried on transient network failures, and land on disk
//! through an atomic commit so a crash never leaves a half-written file.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use download_manager::{DownloadConfig, DownloadEvent, DownloadManager};
//!
//! # async fn example() -> download_manager::Result<()> {
//! // Create the manager and its event receiver
//! let (manager, mut events) = DownloadManager::with_channel(DownloadConfig::default())?;
//!
//! // Queue some files
//! manager.add_download("https://example.com/addons/LibAddonMenu.zip", "/tmp/LibAddonMenu.zip")?;
//! manager.add_download("https://example.com/addons/master.json", "/tmp/master.json")?;
//!
//! // React to lifecycle events
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DownloadEvent::Progress { path, received, total } => {
//!             if let Some(total) = total {
//!                 let percent = (received as f64 / total as f64) * 100.0;
//!                 println!("{}: {:.1}%", path.display(), percent);
//!             }
//!         }
//!         DownloadEvent::Finished { path } => println!("Saved {}", path.display()),
//!         DownloadEvent::Failed { path, reason } => println!("{} failed: {}", path.display(), reason),
//!         DownloadEvent::AllDrained => break,
//!     }
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Bounded concurrency**: adjustable at runtime, never preempts running transfers
//! - **Retry logic**: transport errors and timeouts retried with linear backoff
//! - **Atomic writes**: bodies are staged, synced and renamed into place
//! - **Lifecycle events**: via an `EventSink` or a polled channel
//! - **Freshness checks**: HEAD + `Last-Modified` against a local copy
//! - **Async/await**: Full async support with Tokio runtime

pub mod downloader;
pub mod logging;

// Re-export commonly used types for convenience
pub use downloader::{
    DownloadConfig, DownloadConfigBuilder, DownloadError, DownloadEvent, DownloadEvents,
    DownloadManager, EventSink, Freshness, Result,
};
