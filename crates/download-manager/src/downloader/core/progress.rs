//! Lifecycle events and the sinks that consume them
//!
//! Every event produced by the manager travels through one unbounded channel.
//! Callers either poll that channel themselves ([`DownloadEvents`]) or hand
//! the manager an [`EventSink`], which is then driven by a single delivery
//! task. Either way the consumer sees events one at a time, so a sink may
//! mutate its own state through `&mut self` without further locking.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events emitted by the download manager
///
/// For a given path the order is always `Progress*` followed by exactly one
/// of `Finished` or `Failed`. There is no ordering across paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress {
        path: PathBuf,
        received: u64,
        total: Option<u64>,
    },
    Finished {
        path: PathBuf,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
    /// Queue, active set and pending retries all became empty
    AllDrained,
}

/// Observer for download lifecycle events
pub trait EventSink: Send + 'static {
    fn on_progress(&mut self, _path: &Path, _received: u64, _total: Option<u64>) {}
    fn on_finished(&mut self, _path: &Path) {}
    fn on_failed(&mut self, _path: &Path, _reason: &str) {}
    fn on_all_drained(&mut self) {}

    /// Route one event to the matching callback
    fn deliver(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress { path, received, total } => self.on_progress(&path, received, total),
            DownloadEvent::Finished { path } => self.on_finished(&path),
            DownloadEvent::Failed { path, reason } => self.on_failed(&path, &reason),
            DownloadEvent::AllDrained => self.on_all_drained(),
        }
    }
}

/// Sink backed by a closure receiving whole events
pub struct FnEventSink<F>(F);

impl<F> FnEventSink<F>
where
    F: FnMut(DownloadEvent) + Send + 'static,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> EventSink for FnEventSink<F>
where
    F: FnMut(DownloadEvent) + Send + 'static,
{
    fn deliver(&mut self, event: DownloadEvent) {
        (self.0)(event)
    }
}

/// Null sink that drops everything
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {}

/// Sink that writes terminal events to the tracing subscriber
#[derive(Debug, Default)]
pub struct LoggingEventSink {
    /// Also log every progress update at debug level
    pub verbose: bool,
}

impl LoggingEventSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl EventSink for LoggingEventSink {
    fn on_progress(&mut self, path: &Path, received: u64, total: Option<u64>) {
        if self.verbose {
            match total {
                Some(total) if total > 0 => {
                    let percent = (received as f64 / total as f64) * 100.0;
                    debug!("{}: {:.1}% ({}/{} bytes)", path.display(), percent, received, total);
                }
                _ => debug!("{}: {} bytes", path.display(), received),
            }
        }
    }

    fn on_finished(&mut self, path: &Path) {
        info!("Download completed: {}", path.display());
    }

    fn on_failed(&mut self, path: &Path, reason: &str) {
        warn!("Download failed: {} - {}", path.display(), reason);
    }

    fn on_all_drained(&mut self) {
        info!("All downloads finished");
    }
}

/// Composite sink that forwards events to multiple sinks
pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl std::fmt::Debug for CompositeEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventSink")
            .field("sinks_count", &self.sinks.len())
            .finish()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CompositeEventSink {
    fn deliver(&mut self, event: DownloadEvent) {
        if let Some((last, rest)) = self.sinks.split_last_mut() {
            for sink in rest {
                sink.deliver(event.clone());
            }
            last.deliver(event);
        }
    }
}

/// Receiving end for callers that poll events themselves
#[derive(Debug)]
pub struct DownloadEvents {
    rx: mpsc::UnboundedReceiver<DownloadEvent>,
}

impl DownloadEvents {
    /// Wait for the next event; `None` once the manager is gone
    pub async fn recv(&mut self) -> Option<DownloadEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready
    pub fn try_recv(&mut self) -> Option<DownloadEvent> {
        self.rx.try_recv().ok()
    }
}

/// Sending half shared by the dispatcher and its transfer tasks
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl EventEmitter {
    pub(crate) fn channel() -> (Self, DownloadEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DownloadEvents { rx })
    }

    fn emit(&self, event: DownloadEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }

    pub(crate) fn progress(&self, path: &Path, received: u64, total: Option<u64>) {
        self.emit(DownloadEvent::Progress {
            path: path.to_path_buf(),
            received,
            total,
        });
    }

    pub(crate) fn finished(&self, path: &Path) {
        self.emit(DownloadEvent::Finished { path: path.to_path_buf() });
    }

    pub(crate) fn failed(&self, path: &Path, reason: impl Into<String>) {
        self.emit(DownloadEvent::Failed {
            path: path.to_path_buf(),
            reason: reason.into(),
        });
    }

    pub(crate) fn all_drained(&self) {
        self.emit(DownloadEvent::AllDrained);
    }
}

/// Drive `sink` from `events` on a dedicated task
///
/// The task ends when every sender is gone, or when `stop` fires; in the
/// latter case events already in the channel are still delivered first.
pub(crate) fn spawn_delivery<S: EventSink>(
    mut events: DownloadEvents,
    mut sink: S,
    stop: CancellationToken,
    runtime: &Handle,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => sink.deliver(event),
                    None => break,
                },
                _ = stop.cancelled() => {
                    while let Some(event) = events.try_recv() {
                        sink.deliver(event);
                    }
                    break;
                }
            }
        }
        debug!("Event delivery stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counting {
        progress: usize,
        finished: usize,
        failed: Vec<String>,
        drained: usize,
    }

    impl EventSink for Arc<Mutex<Counting>> {
        fn on_progress(&mut self, _path: &Path, _received: u64, _total: Option<u64>) {
            self.lock().unwrap().progress += 1;
        }
        fn on_finished(&mut self, _path: &Path) {
            self.lock().unwrap().finished += 1;
        }
        fn on_failed(&mut self, _path: &Path, reason: &str) {
            self.lock().unwrap().failed.push(reason.to_string());
        }
        fn on_all_drained(&mut self) {
            self.lock().unwrap().drained += 1;
        }
    }

    #[test]
    fn test_deliver_routes_to_callbacks() {
        let counts = Arc::new(Mutex::new(Counting::default()));
        let mut sink = counts.clone();

        sink.deliver(DownloadEvent::Progress { path: "/a".into(), received: 1, total: Some(2) });
        sink.deliver(DownloadEvent::Finished { path: "/a".into() });
        sink.deliver(DownloadEvent::Failed { path: "/b".into(), reason: "HTTP error 404: Not Found".into() });
        sink.deliver(DownloadEvent::AllDrained);

        let counts = counts.lock().unwrap();
        assert_eq!(counts.progress, 1);
        assert_eq!(counts.finished, 1);
        assert_eq!(counts.failed, vec!["HTTP error 404: Not Found".to_string()]);
        assert_eq!(counts.drained, 1);
    }

    #[test]
    fn test_composite_sink_fans_out() {
        let first = Arc::new(Mutex::new(Counting::default()));
        let second = Arc::new(Mutex::new(Counting::default()));
        let mut composite = CompositeEventSink::new()
            .add_sink(first.clone())
            .add_sink(NullEventSink)
            .add_sink(second.clone());

        composite.deliver(DownloadEvent::Finished { path: "/a".into() });

        assert_eq!(first.lock().unwrap().finished, 1);
        assert_eq!(second.lock().unwrap().finished, 1);
        assert!(format!("{composite:?}").contains("sinks_count: 3"));
    }

    #[tokio::test]
    async fn test_delivery_task_flushes_pending_events_on_stop() {
        let (emitter, events) = EventEmitter::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            FnEventSink::new(move |event| seen.lock().unwrap().push(event))
        };
        let stop = CancellationToken::new();

        emitter.finished(Path::new("/a"));
        emitter.all_drained();
        stop.cancel();
        spawn_delivery(events, sink, stop, &Handle::current()).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![DownloadEvent::Finished { path: "/a".into() }, DownloadEvent::AllDrained]
        );
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_is_harmless() {
        let (emitter, events) = EventEmitter::channel();
        drop(events);
        emitter.failed(Path::new("/a"), "gone");
    }
}
