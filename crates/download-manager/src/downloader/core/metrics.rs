//! Counters for download activity
//!
//! Updated with relaxed atomics from every transfer task; read through an
//! immutable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for one manager
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    pub enqueued: AtomicU64,
    pub rejected: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub retries: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl DownloadMetrics {
    /// Record that a request was accepted into the queue
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a request failed validation
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a file was committed to disk
    pub fn record_completed(&self, size: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(size, Ordering::Relaxed);
    }

    /// Record a terminal failure
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a request was scheduled for another attempt
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> DownloadMetricsSnapshot {
        DownloadMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DownloadMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadMetricsSnapshot {
    pub enqueued: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub bytes_written: u64,
}

impl DownloadMetricsSnapshot {
    /// Share of finished requests that succeeded (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.completed as f64 / finished as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = DownloadMetrics::default();
        metrics.record_enqueued();
        metrics.record_enqueued();
        metrics.record_completed(1024);
        metrics.record_failed();
        metrics.record_retry();
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.enqueued, 2);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.bytes_written, 1024);
        assert_eq!(snapshot.success_rate(), 0.5);
    }

    #[test]
    fn test_success_rate_without_results() {
        assert_eq!(DownloadMetricsSnapshot::default().success_rate(), 0.0);
    }
}
