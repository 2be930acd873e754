//! Delay-ordered queue of pending save requests.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::target::SaveTarget;
use crate::error::{PersistenceError, Result};

/// Far enough out to never fire in practice.
const DISTANT_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A request to write `target` to `destination` once `due` has passed.
pub(crate) struct SaveRequest {
    pub target: Arc<dyn SaveTarget>,
    pub destination: PathBuf,
    pub requested_at: Instant,
    due: Instant,
    sequence: u64,
}

impl SaveRequest {
    fn key(&self) -> (Instant, u64) {
        (self.due, self.sequence)
    }
}

impl PartialEq for SaveRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SaveRequest {}

impl PartialOrd for SaveRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SaveRequest {
    /// Earliest deadline first; insertion order breaks ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<SaveRequest>>,
    next_sequence: u64,
    /// Requests handed out by `poll` and not yet `complete`d.
    in_flight: usize,
}

/// Min-heap keyed on absolute due time, with blocking timed polls.
#[derive(Default)]
pub(crate) struct DelayQueue {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl DelayQueue {
    pub fn push(&self, target: Arc<dyn SaveTarget>, delay: Duration, destination: PathBuf) -> Result<()> {
        let requested_at = Instant::now();
        let due = requested_at
            .checked_add(delay)
            .unwrap_or(requested_at + DISTANT_FUTURE);

        let mut inner = self.lock()?;
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(Reverse(SaveRequest {
            target,
            destination,
            requested_at,
            due,
            sequence,
        }));
        drop(inner);

        // Drain waiters share the condvar, so wake everyone.
        self.changed.notify_all();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.heap.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Wait up to `timeout` for a request whose delay has expired.
    ///
    /// Returns `None` if the timeout passes first, whether or not
    /// not-yet-due requests remain queued.
    pub fn poll(&self, timeout: Duration) -> Result<Option<SaveRequest>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock()?;

        loop {
            let now = Instant::now();
            let next_due = inner.heap.peek().map(|Reverse(head)| head.due);

            if next_due.is_some_and(|due| due <= now) {
                let request = inner.heap.pop().map(|Reverse(request)| request);
                inner.in_flight += 1;
                return Ok(request);
            }
            if now >= deadline {
                return Ok(None);
            }

            let wake_at = next_due.map_or(deadline, |due| due.min(deadline));
            let (guard, _) = self
                .changed
                .wait_timeout(inner, wake_at - now)
                .map_err(|_| PersistenceError::LockPoisoned {
                    what: "autosave queue",
                })?;
            inner = guard;
        }
    }

    /// Mark a request returned by [`poll`](Self::poll) as fully handled.
    pub fn complete(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.in_flight = inner.in_flight.saturating_sub(1);
        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Block until nothing is queued or in flight, or `timeout` passes.
    pub fn wait_drained(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock()?;

        loop {
            if inner.heap.is_empty() && inner.in_flight == 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let (guard, _) = self
                .changed
                .wait_timeout(inner, deadline - now)
                .map_err(|_| PersistenceError::LockPoisoned {
                    what: "autosave queue",
                })?;
            inner = guard;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| PersistenceError::LockPoisoned {
            what: "autosave queue",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct Noop(&'static str);

    impl SaveTarget for Noop {
        fn save_if_dirty(&self, _destination: &Path) -> Result<bool> {
            Ok(false)
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn push(queue: &DelayQueue, name: &'static str, delay_ms: u64) {
        queue
            .push(
                Arc::new(Noop(name)),
                Duration::from_millis(delay_ms),
                PathBuf::from(name),
            )
            .unwrap();
    }

    #[test]
    fn test_poll_returns_earliest_deadline_first() {
        let queue = DelayQueue::default();
        push(&queue, "late", 40);
        push(&queue, "early", 10);

        let first = queue.poll(Duration::from_secs(1)).unwrap().unwrap();
        let second = queue.poll(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(first.target.describe(), "early");
        assert_eq!(second.target.describe(), "late");
    }

    #[test]
    fn test_equal_deadlines_keep_insertion_order() {
        let queue = DelayQueue::default();
        push(&queue, "first", 0);
        push(&queue, "second", 0);
        push(&queue, "third", 0);
        std::thread::sleep(Duration::from_millis(5));

        let names: Vec<String> = (0..3)
            .map(|_| {
                queue
                    .poll(Duration::from_secs(1))
                    .unwrap()
                    .unwrap()
                    .target
                    .describe()
            })
            .collect();
        // Pushed within the same instant or later, so never reordered.
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn test_poll_does_not_return_early() {
        let queue = DelayQueue::default();
        push(&queue, "pending", 500);

        let started = Instant::now();
        assert!(queue.poll(Duration::from_millis(30)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_drain_tracks_in_flight() {
        let queue = DelayQueue::default();
        push(&queue, "only", 0);

        let request = queue.poll(Duration::from_secs(1)).unwrap();
        assert!(request.is_some());
        assert!(!queue.wait_drained(Duration::from_millis(10)).unwrap());

        queue.complete().unwrap();
        assert!(queue.wait_drained(Duration::from_millis(10)).unwrap());
    }
}
