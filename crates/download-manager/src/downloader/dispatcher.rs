//! Admission control, retries and drain detection
//!
//! All scheduling state lives behind one mutex. It is held only to move
//! requests between the queue and the active set, never across network or
//! disk I/O. Transfers and retry timers run as tasks on a [`TaskTracker`] so
//! shutdown can wait for every one of them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::downloader::core::progress::EventEmitter;
use crate::downloader::core::{
    DownloadError, DownloadMetrics, DownloadRequest, DurableWriter, TransferId, TransferOutcome,
};
use crate::downloader::queue::RequestQueue;
use crate::downloader::retry::RetryPolicy;
use crate::downloader::worker::TransferWorker;

#[derive(Debug)]
struct DispatchState {
    queue: RequestQueue,
    /// Admitted transfers and their destinations
    active: HashMap<TransferId, PathBuf>,
    max_concurrent: usize,
    /// Requests sleeping out their backoff
    pending_retries: usize,
    /// Set once "all drained" was emitted, cleared by the next submission
    drain_reported: bool,
    closed: bool,
}

impl DispatchState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty() && self.pending_retries == 0
    }
}

/// Owns the queue and every in-flight transfer
#[derive(Debug)]
pub(crate) struct Dispatcher {
    state: Mutex<DispatchState>,
    worker: TransferWorker,
    writer: DurableWriter,
    retry: RetryPolicy,
    events: EventEmitter,
    metrics: Arc<DownloadMetrics>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    runtime: Handle,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new(
        worker: TransferWorker,
        retry: RetryPolicy,
        max_concurrent: usize,
        events: EventEmitter,
        metrics: Arc<DownloadMetrics>,
        runtime: Handle,
    ) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                queue: RequestQueue::new(),
                active: HashMap::new(),
                max_concurrent: max_concurrent.max(1),
                pending_retries: 0,
                // Nothing to report until the first submission
                drain_reported: true,
                closed: false,
            }),
            worker,
            writer: DurableWriter::new(),
            retry,
            events,
            metrics,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            runtime,
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        // The state stays consistent between statements, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a validated request and admit what the budget allows
    pub(crate) fn submit(self: &Arc<Self>, request: DownloadRequest) {
        let mut state = self.lock();
        if state.closed {
            debug!("Ignoring {} submitted after shutdown", request.url);
            return;
        }

        debug!("Queueing {} -> {}", request.url, request.destination.display());
        state.queue.enqueue(request);
        state.drain_reported = false;
        self.metrics.record_enqueued();
        self.on_queue_changed(&mut state);
    }

    /// Admit queued requests into free slots, then check for drain
    fn on_queue_changed(self: &Arc<Self>, state: &mut DispatchState) {
        if state.closed {
            return;
        }

        let available = state.max_concurrent.saturating_sub(state.active.len());
        for _ in 0..available {
            let Some(request) = state.queue.dequeue() else {
                break;
            };
            let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
            state.active.insert(id, request.destination.clone());
            debug!(
                "Admitted transfer {} ({} active, {} queued)",
                id,
                state.active.len(),
                state.queue.len()
            );

            let dispatcher = Arc::clone(self);
            self.tasks
                .spawn_on(dispatcher.run_transfer(id, request), &self.runtime);
        }

        if state.is_drained() && !state.drain_reported {
            state.drain_reported = true;
            info!("All downloads drained");
            self.events.all_drained();
        }
    }

    async fn run_transfer(self: Arc<Self>, id: TransferId, request: DownloadRequest) {
        let span = info_span!(
            "transfer",
            %id,
            url = %request.url,
            path = %request.destination.display(),
            attempt = request.retry_count + 1
        );

        async move {
            let events = self.events.clone();
            let path = request.destination.clone();
            let outcome = self
                .worker
                .execute(&request, &self.cancel, |received, total| {
                    events.progress(&path, received, total)
                })
                .await;

            let retry = self.resolve(request, outcome).await;
            self.release(id, retry);
        }
        .instrument(span)
        .await
    }

    /// Act on a terminal outcome; returns the next attempt if one is due
    async fn resolve(&self, request: DownloadRequest, outcome: TransferOutcome) -> Option<DownloadRequest> {
        let path = request.destination.clone();

        match outcome {
            TransferOutcome::Cancelled => {
                debug!("Transfer cancelled, no event emitted");
                None
            }
            TransferOutcome::Success { body, declared_len } => {
                match self.writer.commit_async(path.clone(), body, declared_len).await {
                    Ok(written) => {
                        self.metrics.record_completed(written);
                        info!("Saved {} bytes to {}", written, path.display());
                        self.events.finished(&path);
                    }
                    Err(e) => {
                        self.metrics.record_failed();
                        self.events.failed(&path, e.to_string());
                    }
                }
                None
            }
            outcome if outcome.is_transient() && self.cancel.is_cancelled() => {
                debug!("Discarding failed attempt during shutdown");
                None
            }
            outcome if self.retry.should_retry(&request, &outcome) => Some(request.next_attempt()),
            outcome => {
                let error = self.final_error(&request, outcome);
                self.metrics.record_failed();
                error!("Download failed: {}", error);
                self.events.failed(&path, error.to_string());
                None
            }
        }
    }

    fn final_error(&self, request: &DownloadRequest, outcome: TransferOutcome) -> DownloadError {
        let transient = outcome.is_transient();
        let error = outcome.into_error(&request.url).unwrap_or_else(|| DownloadError::Cancelled {
            url: request.url.to_string(),
        });

        if !transient || request.retry_count == 0 {
            return error;
        }

        let last_error = match error {
            DownloadError::Network { reason, .. } => reason,
            other => other.to_string(),
        };
        DownloadError::RetriesExhausted {
            url: request.url.to_string(),
            retries: request.retry_count,
            last_error,
        }
    }

    /// Free the slot of `id`, arm the retry timer if any, and refill
    fn release(self: &Arc<Self>, id: TransferId, retry: Option<DownloadRequest>) {
        let mut state = self.lock();
        state.active.remove(&id);

        if let Some(request) = retry {
            if state.closed {
                debug!("Dropping retry of {} during shutdown", request.url);
            } else {
                state.pending_retries += 1;
                self.schedule_retry(request);
            }
        }

        self.on_queue_changed(&mut state);
    }

    fn schedule_retry(self: &Arc<Self>, request: DownloadRequest) {
        let delay = self.retry.backoff(request.retry_count);
        self.metrics.record_retry();
        warn!(
            "Retrying {} in {:?} (retry {}/{})",
            request.url,
            delay,
            request.retry_count,
            self.retry.max_retries()
        );

        let dispatcher = Arc::clone(self);
        self.tasks.spawn_on(
            async move {
                tokio::select! {
                    biased;
                    _ = dispatcher.cancel.cancelled() => {
                        dispatcher.lock().pending_retries -= 1;
                        debug!("Retry timer for {} cancelled", request.url);
                    }
                    _ = tokio::time::sleep(delay) => {
                        let mut state = dispatcher.lock();
                        state.pending_retries -= 1;
                        if !state.closed {
                            state.queue.enqueue(request);
                        }
                        dispatcher.on_queue_changed(&mut state);
                    }
                }
            },
            &self.runtime,
        );
    }

    /// Change the slot budget; values below 1 become 1
    ///
    /// Lowering the budget never interrupts running transfers, it only holds
    /// back admissions until enough of them finish.
    pub(crate) fn set_max_concurrent(self: &Arc<Self>, max_concurrent: usize) {
        if max_concurrent == 0 {
            warn!("Concurrency limit of 0 requested, using 1");
        }
        let mut state = self.lock();
        state.max_concurrent = max_concurrent.max(1);
        debug!("Concurrency limit set to {}", state.max_concurrent);
        self.on_queue_changed(&mut state);
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }

    pub(crate) fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub(crate) fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Stop admitting, drop the queue and cancel everything in flight
    pub(crate) fn close(&self) {
        let dropped = {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear()
        };
        if dropped > 0 {
            info!("Discarded {} queued downloads", dropped);
        }
        self.cancel.cancel();
        self.tasks.close();
    }

    /// [`close`](Self::close), then wait for every transfer and retry timer
    pub(crate) async fn shutdown(&self) {
        self.close();
        self.tasks.wait().await;
        debug!("All transfer tasks finished");
    }
}
