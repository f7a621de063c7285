//! Public entry point
//!
//! The call chain flows as follows:
//!
//! User Code
//! ↓
//! DownloadManager (this file)
//! ↓
//! Dispatcher (dispatcher.rs) - queue, slots, retries
//! ↓
//! TransferWorker (worker.rs) - one attempt, deadline, progress
//! ↓
//! Transport (core/http.rs)
//!
//! Completed bodies go back up to the dispatcher, which commits them through
//! the DurableWriter (core/files.rs) and emits the lifecycle events.

use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::http::build_client;
use crate::downloader::core::progress::{spawn_delivery, EventEmitter};
use crate::downloader::core::{
    DownloadError, DownloadEvents, DownloadMetrics, DownloadMetricsSnapshot, DownloadRequest,
    EventSink, HttpTransport, Result, Transport,
};
use crate::downloader::dispatcher::Dispatcher;
use crate::downloader::freshness::{check_freshness, Freshness};
use crate::downloader::retry::RetryPolicy;
use crate::downloader::worker::TransferWorker;

/// Concurrent download manager
///
/// Requests are queued in FIFO order and run in at most
/// `max_concurrent_downloads()` parallel transfers. Transient failures are
/// retried with linear backoff, and completed bodies are committed
/// atomically to their destination. Lifecycle events go either to an
/// [`EventSink`] or to a [`DownloadEvents`] receiver.
///
/// Must be created inside a Tokio runtime; the handle is captured so that
/// [`add_download`](Self::add_download) can be called from any thread.
pub struct DownloadManager {
    config: DownloadConfig,
    dispatcher: Arc<Dispatcher>,
    events: EventEmitter,
    metrics: Arc<DownloadMetrics>,
    client: Client,
    runtime: Handle,
    delivery: Option<(JoinHandle<()>, CancellationToken)>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("config", &self.config)
            .field("active", &self.dispatcher.active_count())
            .field("queued", &self.dispatcher.queued_count())
            .finish()
    }
}

impl DownloadManager {
    /// Create a manager using reqwest, delivering events to `sink`
    pub fn new<S: EventSink>(config: DownloadConfig, sink: S) -> Result<Self> {
        let client = build_client(&config)?;
        let transport = Arc::new(HttpTransport::new(client.clone()));
        let (manager, events) = Self::assemble(config, transport, client)?;
        Ok(manager.with_sink(events, sink))
    }

    /// Create a manager using reqwest, returning the event receiver
    pub fn with_channel(config: DownloadConfig) -> Result<(Self, DownloadEvents)> {
        let client = build_client(&config)?;
        let transport = Arc::new(HttpTransport::new(client.clone()));
        Self::assemble(config, transport, client)
    }

    /// Create a manager over a custom transport, delivering events to `sink`
    pub fn with_transport<S: EventSink>(
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
        sink: S,
    ) -> Result<Self> {
        let client = build_client(&config)?;
        let (manager, events) = Self::assemble(config, transport, client)?;
        Ok(manager.with_sink(events, sink))
    }

    /// Create a manager over a custom transport, returning the event receiver
    pub fn with_transport_and_channel(
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, DownloadEvents)> {
        let client = build_client(&config)?;
        Self::assemble(config, transport, client)
    }

    fn assemble(
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
        client: Client,
    ) -> Result<(Self, DownloadEvents)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| DownloadError::Configuration {
            message: format!("download manager must be created inside a Tokio runtime: {e}"),
            field: None,
        })?;

        let (events, receiver) = EventEmitter::channel();
        let metrics = Arc::new(DownloadMetrics::default());
        let dispatcher = Arc::new(Dispatcher::new(
            TransferWorker::from_config(transport, &config),
            RetryPolicy::from_config(&config),
            config.max_concurrent,
            events.clone(),
            Arc::clone(&metrics),
            runtime.clone(),
        ));

        info!(
            "Download manager ready (max {} concurrent, {} retries, {:?} timeout)",
            config.max_concurrent.max(1),
            config.max_retries,
            config.request_timeout
        );

        let manager = Self {
            config,
            dispatcher,
            events,
            metrics,
            client,
            runtime,
            delivery: None,
        };
        Ok((manager, receiver))
    }

    fn with_sink<S: EventSink>(mut self, events: DownloadEvents, sink: S) -> Self {
        let stop = CancellationToken::new();
        let handle = spawn_delivery(events, sink, stop.clone(), &self.runtime);
        self.delivery = Some((handle, stop));
        self
    }

    /// Queue `url` for download into `destination`
    ///
    /// An empty `destination` is derived from the URL's file name under
    /// [`DownloadConfig::default_destination_dir`]. Invalid requests are
    /// rejected here: the error is returned and a failed event is emitted,
    /// and nothing is queued.
    pub fn add_download(&self, url: &str, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let default_dir = self.config.default_destination_dir.as_deref();

        match DownloadRequest::new(url, destination, default_dir) {
            Ok(request) => {
                self.dispatcher.submit(request);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected download request: {}", e);
                self.metrics.record_rejected();
                self.events.failed(destination, e.to_string());
                Err(e)
            }
        }
    }

    /// Change the concurrency budget; values below 1 become 1
    ///
    /// Takes effect immediately for admissions. Running transfers are never
    /// aborted when the budget shrinks.
    pub fn set_max_concurrent_downloads(&self, max_concurrent: usize) {
        self.dispatcher.set_max_concurrent(max_concurrent);
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.dispatcher.max_concurrent()
    }

    /// Number of transfers currently holding a slot
    pub fn active_downloads(&self) -> usize {
        self.dispatcher.active_count()
    }

    /// Number of requests waiting for a slot
    pub fn queued_downloads(&self) -> usize {
        self.dispatcher.queued_count()
    }

    pub fn metrics(&self) -> DownloadMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether `local_path` is older than the remote file at `url`
    pub async fn check_freshness(&self, url: &str, local_path: impl AsRef<Path>) -> Result<Freshness> {
        let url = Url::parse(url.trim())?;
        check_freshness(&self.client, &url, local_path.as_ref()).await
    }

    /// Cancel everything and wait for it to wind down
    ///
    /// Queued requests are discarded, in-flight transfers and retry timers
    /// are cancelled without emitting events, and events already produced
    /// are delivered before this returns. No sink callback runs afterwards.
    pub async fn shutdown(mut self) {
        info!("Shutting down download manager");
        self.dispatcher.shutdown().await;

        if let Some((handle, stop)) = self.delivery.take() {
            stop.cancel();
            if let Err(e) = handle.await {
                warn!("Event delivery task ended abnormally: {}", e);
            }
        }
        debug!("Download manager shut down");
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        self.dispatcher.close();
        if let Some((_, stop)) = &self.delivery {
            stop.cancel();
        }
    }
}
