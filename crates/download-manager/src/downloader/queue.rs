//! FIFO holding area for requests waiting on a worker slot

use std::collections::VecDeque;

use crate::downloader::core::DownloadRequest;

/// Pending requests in insertion order
///
/// Not synchronised on its own: it lives inside the dispatcher's state and is
/// only touched while that lock is held.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<DownloadRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail; retried requests come through here too
    pub fn enqueue(&mut self, request: DownloadRequest) {
        self.pending.push_back(request);
    }

    /// Pop the head, `None` when empty
    pub fn dequeue(&mut self) -> Option<DownloadRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything still waiting, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(name: &str) -> DownloadRequest {
        let dest = std::env::temp_dir().join(name);
        DownloadRequest::new(&format!("https://example.com/{name}"), &dest, None).unwrap()
    }

    fn names(queue: &mut RequestQueue) -> Vec<PathBuf> {
        std::iter::from_fn(|| queue.dequeue())
            .map(|r| PathBuf::from(r.destination.file_name().unwrap()))
            .collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RequestQueue::new();
        queue.enqueue(request("a.zip"));
        queue.enqueue(request("b.zip"));
        queue.enqueue(request("c.zip"));

        assert_eq!(queue.len(), 3);
        assert_eq!(names(&mut queue), vec![PathBuf::from("a.zip"), "b.zip".into(), "c.zip".into()]);
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_retried_request_goes_to_tail() {
        let mut queue = RequestQueue::new();
        queue.enqueue(request("a.zip"));
        queue.enqueue(request("b.zip"));

        let failed = queue.dequeue().unwrap();
        queue.enqueue(request("c.zip"));
        queue.enqueue(failed.next_attempt());

        assert_eq!(names(&mut queue), vec![PathBuf::from("b.zip"), "c.zip".into(), "a.zip".into()]);
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let mut queue = RequestQueue::new();
        queue.enqueue(request("a.zip"));
        queue.enqueue(request("a.zip"));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
