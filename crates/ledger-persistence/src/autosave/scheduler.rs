//! The shared background autosave worker.
//!
//! Writes run on one background thread. A request only writes if its target
//! is still dirty when the request's delay expires, so a burst of changes
//! costs one write.
//!
//! # Lifecycle
//!
//! ```text
//! register_for_save ──> queue non-empty, no worker? ──> spawn worker
//!                                                           │
//!          ┌────────────── poll(idle_timeout) <─────────────┘
//!          │ request due          │ timed out, queue empty
//!          v                      v
//!    save_if_dirty          clear worker slot, then
//!                           restart if work arrived meanwhile
//! ```
//!
//! The worker thread is detached; the process does not wait for it on exit.
//! Save explicitly before shutting down.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use super::config::SchedulerConfig;
use super::queue::{DelayQueue, SaveRequest};
use super::target::SaveTarget;
use crate::error::{PersistenceError, Result};

static GLOBAL: OnceLock<AutosaveScheduler> = OnceLock::new();

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub workers_started: u64,
    /// Highest number of workers ever alive at once. Never above 1.
    pub peak_workers: usize,
    pub saves_written: u64,
    /// Requests dropped because the target was already clean.
    pub requests_skipped: u64,
    pub saves_failed: u64,
}

#[derive(Default)]
struct Counters {
    workers_started: AtomicU64,
    active_workers: AtomicUsize,
    peak_workers: AtomicUsize,
    saves_written: AtomicU64,
    requests_skipped: AtomicU64,
    saves_failed: AtomicU64,
}

struct Shared {
    config: SchedulerConfig,
    queue: DelayQueue,
    /// Id of the running worker. Guarded separately from any target lock.
    worker: Mutex<Option<u64>>,
    next_worker_id: AtomicU64,
    counters: Counters,
}

/// Handle to an autosave scheduler. Cheap to clone; clones share one queue
/// and one worker.
///
/// Most code uses [`AutosaveScheduler::global`]. Tests build their own with
/// [`AutosaveScheduler::new`] to get isolated state and short timeouts.
#[derive(Clone)]
pub struct AutosaveScheduler {
    shared: Arc<Shared>,
}

impl Default for AutosaveScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl AutosaveScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: DelayQueue::default(),
                worker: Mutex::new(None),
                next_worker_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// The process-wide scheduler, created with default settings on first use.
    pub fn global() -> &'static AutosaveScheduler {
        GLOBAL.get_or_init(AutosaveScheduler::default)
    }

    /// Queue a save of `target` to `destination` once `delay` has passed,
    /// starting the worker if none is running.
    ///
    /// Never blocks on I/O.
    pub fn register_for_save(
        &self,
        target: Arc<dyn SaveTarget>,
        delay: Duration,
        destination: impl Into<PathBuf>,
    ) -> Result<()> {
        let destination = destination.into();
        tracing::debug!(
            ledger = %target.describe(),
            path = %destination.display(),
            delay_ms = delay.as_millis() as u64,
            "Queued autosave request"
        );
        self.shared.queue.push(target, delay, destination)?;
        Shared::maybe_start(&self.shared)
    }

    /// Number of queued requests not yet picked up.
    pub fn pending(&self) -> usize {
        self.shared.queue.len().unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .worker
            .lock()
            .map(|worker| worker.is_some())
            .unwrap_or(false)
    }

    /// Block until every queued request has been handled, or `timeout`
    /// passes. Returns whether the queue drained.
    pub fn wait_for_drain(&self, timeout: Duration) -> Result<bool> {
        self.shared.queue.wait_drained(timeout)
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        SchedulerStats {
            workers_started: counters.workers_started.load(Ordering::SeqCst),
            peak_workers: counters.peak_workers.load(Ordering::SeqCst),
            saves_written: counters.saves_written.load(Ordering::SeqCst),
            requests_skipped: counters.requests_skipped.load(Ordering::SeqCst),
            saves_failed: counters.saves_failed.load(Ordering::SeqCst),
        }
    }
}

impl Shared {
    /// Start a worker if there is work and none is running.
    fn maybe_start(shared: &Arc<Shared>) -> Result<()> {
        if shared.queue.is_empty()? {
            return Ok(());
        }

        let mut worker = shared.worker.lock().map_err(|_| PersistenceError::LockPoisoned {
            what: "autosave worker slot",
        })?;
        if worker.is_some() {
            return Ok(());
        }

        let id = shared.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let worker_shared = Arc::clone(shared);
        thread::Builder::new()
            .name(shared.config.thread_name.clone())
            .spawn(move || run_worker(worker_shared, id))
            .map_err(|e| PersistenceError::WorkerSpawn { source: e })?;

        // Still holding the slot lock, so the new worker cannot reach its
        // shutdown path before this is recorded.
        *worker = Some(id);
        shared.counters.workers_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&self, request: &SaveRequest) {
        let ledger = request.target.describe();
        let waited_ms = request.requested_at.elapsed().as_millis() as u64;

        match request.target.save_if_dirty(&request.destination) {
            Ok(true) => {
                self.counters.saves_written.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    ledger = %ledger,
                    path = %request.destination.display(),
                    waited_ms,
                    "Autosaved ledger"
                );
            }
            Ok(false) => {
                self.counters.requests_skipped.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(ledger = %ledger, "Ledger already clean, dropping request");
            }
            Err(e) => {
                // Keep serving other ledgers. This one stays dirty and is
                // queued again on its next change.
                self.counters.saves_failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    ledger = %ledger,
                    path = %request.destination.display(),
                    error = %e,
                    "Autosave failed"
                );
            }
        }
    }

    /// A panic inside the target counts as a failed save.
    fn process_guarded(&self, request: SaveRequest) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.process(&request))).is_err() {
            self.counters.saves_failed.fetch_add(1, Ordering::SeqCst);
            tracing::error!(
                path = %request.destination.display(),
                "Autosave panicked; other ledgers are unaffected"
            );
        }

        if let Err(e) = self.queue.complete() {
            tracing::error!(error = %e, "Could not mark autosave request complete");
        }
    }

    fn enter_worker(&self) {
        let active = self.counters.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_workers.fetch_max(active, Ordering::SeqCst);
    }

    fn leave_worker(&self) {
        self.counters.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_worker(shared: Arc<Shared>, id: u64) {
    shared.enter_worker();
    tracing::info!(worker = id, "Autosave worker starting up");
    let idle_timeout = shared.config.idle_timeout();

    loop {
        let request = match shared.queue.poll(idle_timeout) {
            Ok(Some(request)) => request,
            Ok(None) => match shared.queue.is_empty() {
                // Nothing to do for a whole idle period; exit and free the
                // thread. The next registration starts a fresh worker.
                Ok(true) => break,
                // Work exists but is not due yet.
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(worker = id, error = %e, "Autosave worker lost its queue");
                    break;
                }
            },
            Err(e) => {
                tracing::error!(worker = id, error = %e, "Autosave worker interrupted while waiting");
                break;
            }
        };

        shared.process_guarded(request);
    }

    tracing::info!(worker = id, "Autosave worker shutting down");
    shared.leave_worker();

    match shared.worker.lock() {
        Ok(mut worker) => {
            debug_assert_eq!(*worker, Some(id), "only one autosave worker may run");
            *worker = None;
        }
        Err(_) => {
            tracing::error!(worker = id, "Autosave worker slot poisoned, cannot restart");
            return;
        }
    }

    // A request may have arrived after the empty check above but while the
    // slot still named this worker; its registration saw a running worker
    // and did not start one.
    if let Err(e) = Shared::maybe_start(&shared) {
        tracing::error!(error = %e, "Could not restart autosave worker");
    }
}
