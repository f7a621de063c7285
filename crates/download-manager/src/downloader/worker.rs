//! Single-attempt transfer execution
//!
//! A worker runs one request through the transport under a hard deadline and
//! the manager's cancellation token, throttling progress on the way. It never
//! touches the filesystem.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{DownloadRequest, TransferOutcome, Transport};

/// Runs transfer attempts against a [`Transport`]
#[derive(Clone)]
pub struct TransferWorker {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    progress_interval: Duration,
}

impl std::fmt::Debug for TransferWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferWorker")
            .field("timeout", &self.timeout)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl TransferWorker {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, progress_interval: Duration) -> Self {
        Self {
            transport,
            timeout,
            progress_interval,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &DownloadConfig) -> Self {
        Self::new(transport, config.request_timeout, config.progress_interval)
    }

    /// Perform one attempt of `request`
    ///
    /// Resolves to exactly one outcome. The deadline covers the whole
    /// attempt, body included; when it elapses or `cancel` fires the
    /// in-flight request is dropped, which aborts it.
    pub async fn execute<F>(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> TransferOutcome
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let mut throttle = ProgressThrottle::new(self.progress_interval);

        let outcome = {
            let mut report = |received: u64, total: Option<u64>| {
                if throttle.admit(received) {
                    on_progress(received, total);
                }
            };
            let fetch = self.transport.fetch(&request.url, &mut report);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Transfer of {} cancelled", request.url);
                    TransferOutcome::Cancelled
                }
                result = tokio::time::timeout(self.timeout, fetch) => match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("Request to {} timed out after {:?}", request.url, self.timeout);
                        TransferOutcome::TimedOut(self.timeout)
                    }
                },
            }
        };

        // Whatever the throttle held back, the final byte count is always reported
        if let TransferOutcome::Success { body, declared_len } = &outcome {
            let received = body.len() as u64;
            if throttle.last_reported() != Some(received) {
                on_progress(received, *declared_len);
            }
        }

        outcome
    }
}

/// Rate limiter for progress reports of one transfer
#[derive(Debug)]
struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_received: Option<u64>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_received: None,
        }
    }

    /// First report always passes, later ones once `interval` has elapsed
    fn admit(&mut self, received: u64) -> bool {
        let now = Instant::now();
        let due = self
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_emit = Some(now);
            self.last_received = Some(received);
        }
        due
    }

    fn last_reported(&self) -> Option<u64> {
        self.last_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::core::http::ProgressFn;
    use async_trait::async_trait;
    use url::Url;

    /// Streams `chunks` with `gap` between them, or never answers if `hang`
    struct ChunkedTransport {
        chunks: Vec<Vec<u8>>,
        gap: Duration,
        hang: bool,
    }

    #[async_trait]
    impl Transport for ChunkedTransport {
        async fn fetch(&self, _url: &Url, progress: &mut ProgressFn<'_>) -> TransferOutcome {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let total: u64 = self.chunks.iter().map(|c| c.len() as u64).sum();
            let mut body = Vec::new();
            progress(0, Some(total));
            for chunk in &self.chunks {
                tokio::time::sleep(self.gap).await;
                body.extend_from_slice(chunk);
                progress(body.len() as u64, Some(total));
            }
            TransferOutcome::Success { body, declared_len: Some(total) }
        }
    }

    fn request() -> DownloadRequest {
        DownloadRequest::new("https://example.com/a.zip", &std::env::temp_dir().join("a.zip"), None).unwrap()
    }

    fn worker(transport: ChunkedTransport) -> TransferWorker {
        TransferWorker::new(Arc::new(transport), Duration::from_secs(12), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_throttled_but_final_count_reported() {
        let worker = worker(ChunkedTransport {
            chunks: vec![vec![0; 10]; 10],
            gap: Duration::from_millis(30),
            hang: false,
        });
        let mut seen = Vec::new();

        let outcome = worker
            .execute(&request(), &CancellationToken::new(), |received, total| seen.push((received, total)))
            .await;

        assert!(matches!(outcome, TransferOutcome::Success { ref body, .. } if body.len() == 100));
        assert_eq!(seen.first(), Some(&(0, Some(100))));
        assert_eq!(seen.last(), Some(&(100, Some(100))));
        assert!(seen.len() < 11, "expected throttling, got {} reports", seen.len());
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transfer_times_out() {
        let worker = worker(ChunkedTransport { chunks: vec![], gap: Duration::ZERO, hang: true });
        let start = Instant::now();

        let outcome = worker.execute(&request(), &CancellationToken::new(), |_, _| {}).await;

        assert_eq!(outcome, TransferOutcome::TimedOut(Duration::from_secs(12)));
        assert!(start.elapsed() >= Duration::from_secs(12));
        assert!(start.elapsed() < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_over_transfer() {
        let worker = worker(ChunkedTransport { chunks: vec![], gap: Duration::ZERO, hang: true });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome = worker.execute(&request(), &cancel, |_, _| {}).await;

        assert_eq!(outcome, TransferOutcome::Cancelled);
    }
}
