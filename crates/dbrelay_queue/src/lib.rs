//! Bounded, thread-safe priority queue for inbound RPC requests (§4.3).
//!
//! Four priority bands (LOW < NORMAL < HIGH < URGENT); every operation is
//! serialized by a single mutex, including the expiry sweep that runs on
//! every `dequeue()`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dbrelay_core::RequestPriority;

const BANDS: usize = 4;

fn band_index(priority: RequestPriority) -> usize {
    match priority {
        RequestPriority::Low => 0,
        RequestPriority::Normal => 1,
        RequestPriority::High => 2,
        RequestPriority::Urgent => 3,
    }
}

/// One request sitting in the queue, carrying an opaque payload `T` owned
/// by the caller (typically the pending-response handle plus the parsed
/// request).
pub struct QueuedRequest<T> {
    pub request_id: String,
    pub payload: T,
    pub priority: RequestPriority,
    pub created_at: Instant,
    pub timeout: Option<Duration>,
}

impl<T> QueuedRequest<T> {
    fn is_expired(&self) -> bool {
        match self.timeout {
            Some(timeout) => self.created_at.elapsed() > timeout,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatistics {
    pub total_enqueued: u64,
    pub processed: u64,
    pub expired: u64,
    pub rejected: u64,
    pub current_size: usize,
    pub pending: usize,
    pub max_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("request {0} already exists in queue")]
    Duplicate(String),
    #[error("queue is full (max_size={0})")]
    Full(usize),
}

struct Inner<T> {
    bands: [VecDeque<QueuedRequest<T>>; BANDS],
    /// request_id -> band index, so `remove()` doesn't need to scan all bands.
    locations: HashMap<String, usize>,
    stats: QueueStatistics,
}

pub struct RequestQueue<T> {
    max_size: usize,
    default_timeout: Option<Duration>,
    inner: Mutex<Inner<T>>,
}

impl<T> RequestQueue<T> {
    pub fn new(max_size: usize, default_timeout: Option<Duration>) -> Self {
        Self {
            max_size,
            default_timeout,
            inner: Mutex::new(Inner {
                bands: Default::default(),
                locations: HashMap::new(),
                stats: QueueStatistics {
                    max_size,
                    ..Default::default()
                },
            }),
        }
    }

    /// Adds a request to the queue. Rejects a duplicate `request_id` or a
    /// full queue without touching queue size (§8 properties 6, 7).
    pub fn enqueue(
        &self,
        request_id: String,
        payload: T,
        priority: RequestPriority,
        timeout: Option<Duration>,
    ) -> Result<(), EnqueueError> {
        let mut inner = self.inner.lock().expect("request queue mutex poisoned");

        if inner.locations.contains_key(&request_id) {
            return Err(EnqueueError::Duplicate(request_id));
        }
        if inner.stats.current_size >= self.max_size {
            inner.stats.rejected += 1;
            return Err(EnqueueError::Full(self.max_size));
        }

        let band = band_index(priority);
        inner.locations.insert(request_id.clone(), band);
        inner.bands[band].push_back(QueuedRequest {
            request_id,
            payload,
            priority,
            created_at: Instant::now(),
            timeout: timeout.or(self.default_timeout),
        });
        inner.stats.total_enqueued += 1;
        inner.stats.current_size += 1;
        inner.stats.pending += 1;
        Ok(())
    }

    /// Returns the oldest non-expired request from the highest non-empty
    /// band. Expired entries encountered along the way are dropped and
    /// counted (§4.3).
    pub fn dequeue(&self) -> Option<QueuedRequest<T>> {
        let mut inner = self.inner.lock().expect("request queue mutex poisoned");
        self.remove_expired_locked(&mut inner);

        for band in (0..BANDS).rev() {
            if let Some(request) = inner.bands[band].pop_front() {
                inner.locations.remove(&request.request_id);
                inner.stats.current_size -= 1;
                inner.stats.pending -= 1;
                inner.stats.processed += 1;
                return Some(request);
            }
        }
        None
    }

    /// Removes a request by id before it is dequeued, e.g. when the
    /// waiting handler gives up. Returns `false` if it's already gone
    /// (dequeued, expired, or never existed) — a benign race, not an error.
    pub fn remove(&self, request_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("request queue mutex poisoned");
        let Some(band) = inner.locations.remove(request_id) else {
            return false;
        };
        if let Some(pos) = inner.bands[band]
            .iter()
            .position(|r| r.request_id == request_id)
        {
            inner.bands[band].remove(pos);
            inner.stats.current_size -= 1;
            inner.stats.pending -= 1;
            true
        } else {
            false
        }
    }

    fn remove_expired_locked(&self, inner: &mut Inner<T>) {
        for band in 0..BANDS {
            let mut i = 0;
            while i < inner.bands[band].len() {
                if inner.bands[band][i].is_expired() {
                    let request = inner.bands[band].remove(i).unwrap();
                    inner.locations.remove(&request.request_id);
                    inner.stats.current_size -= 1;
                    inner.stats.pending -= 1;
                    inner.stats.expired += 1;
                } else {
                    i += 1;
                }
            }
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().expect("request queue mutex poisoned").stats.current_size
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size
    }

    pub fn statistics(&self) -> QueueStatistics {
        self.inner.lock().expect("request queue mutex poisoned").stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_dequeues_highest_first() {
        let q: RequestQueue<&'static str> = RequestQueue::new(10, None);
        q.enqueue("l1".into(), "l1", RequestPriority::Low, None).unwrap();
        q.enqueue("h1".into(), "h1", RequestPriority::High, None).unwrap();
        q.enqueue("n1".into(), "n1", RequestPriority::Normal, None).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| q.dequeue())
            .map(|r| r.payload)
            .collect();
        assert_eq!(order, vec!["h1", "n1", "l1"]);
    }

    #[test]
    fn duplicate_request_id_is_rejected_without_growing_queue() {
        let q: RequestQueue<()> = RequestQueue::new(10, None);
        q.enqueue("a".into(), (), RequestPriority::Normal, None).unwrap();
        let size_before = q.size();
        let err = q
            .enqueue("a".into(), (), RequestPriority::Normal, None)
            .unwrap_err();
        assert!(matches!(err, EnqueueError::Duplicate(_)));
        assert_eq!(q.size(), size_before);
    }

    #[test]
    fn full_queue_rejects_and_counts_rejection() {
        let q: RequestQueue<()> = RequestQueue::new(1, None);
        q.enqueue("a".into(), (), RequestPriority::Normal, None).unwrap();
        let err = q
            .enqueue("b".into(), (), RequestPriority::Normal, None)
            .unwrap_err();
        assert!(matches!(err, EnqueueError::Full(1)));
        assert_eq!(q.statistics().rejected, 1);
    }

    #[test]
    fn expired_entries_are_skipped_on_dequeue() {
        let q: RequestQueue<()> = RequestQueue::new(10, None);
        q.enqueue(
            "expired".into(),
            (),
            RequestPriority::Normal,
            Some(Duration::from_millis(1)),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        q.enqueue("fresh".into(), (), RequestPriority::Normal, None).unwrap();

        let next = q.dequeue().unwrap();
        assert_eq!(next.request_id, "fresh");
        assert_eq!(q.statistics().expired, 1);
    }

    #[test]
    fn current_size_never_exceeds_max_size() {
        let q: RequestQueue<()> = RequestQueue::new(3, None);
        for i in 0..5 {
            let _ = q.enqueue(format!("r{i}"), (), RequestPriority::Normal, None);
            assert!(q.statistics().current_size <= 3);
        }
    }
}
