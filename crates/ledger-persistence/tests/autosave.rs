//! Integration tests for the autosave scheduler.
//!
//! Timing assertions leave wide margins; only lower bounds on when a write
//! may happen are tight.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ledger_persistence::{
    AutosaveConfig, AutosaveListener, AutosaveScheduler, Ledger, LedgerCodec, Result, SaveTarget,
    SchedulerConfig, Tracked, load_from_file,
};
use tempfile::tempdir;

fn scheduler(idle_ms: u64) -> AutosaveScheduler {
    AutosaveScheduler::new(
        SchedulerConfig::default()
            .with_idle_timeout(Duration::from_millis(idle_ms))
            .with_thread_name("autosave-test"),
    )
}

/// Records when each successful write landed.
#[derive(Default)]
struct WriteLog {
    writes: Mutex<Vec<Instant>>,
}

impl WriteLog {
    fn count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn first(&self) -> Option<Instant> {
        self.writes.lock().unwrap().first().copied()
    }
}

impl AutosaveListener for WriteLog {
    fn on_after_save(&self, _destination: &Path) {
        self.writes.lock().unwrap().push(Instant::now());
    }
}

/// In-memory target; counts writes.
#[derive(Default)]
struct FakeTarget {
    dirty: AtomicBool,
    writes: AtomicUsize,
}

impl FakeTarget {
    fn dirty() -> Arc<Self> {
        let target = Arc::new(Self::default());
        target.dirty.store(true, Ordering::SeqCst);
        target
    }
}

impl SaveTarget for FakeTarget {
    fn save_if_dirty(&self, _destination: &Path) -> Result<bool> {
        if self.dirty.swap(false, Ordering::SeqCst) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn describe(&self) -> String {
        "target".to_string()
    }
}

#[test]
fn test_burst_of_registrations_writes_once_after_delay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("burst.ledger");
    let scheduler = scheduler(1000);

    let tracked = Tracked::new("burst", LedgerCodec, Ledger::new("burst"));
    let log = Arc::new(WriteLog::default());
    tracked.set_listener(log.clone()).unwrap();
    tracked.update(|l| l.record("cash", 100, None)).unwrap();

    let started = Instant::now();
    for _ in 0..10 {
        let target: Arc<dyn SaveTarget> = tracked.clone();
        scheduler
            .register_for_save(target, Duration::from_millis(200), &path)
            .unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(!path.exists());

    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());

    assert!(path.exists());
    assert_eq!(log.count(), 1);
    assert!(log.first().unwrap().duration_since(started) >= Duration::from_millis(200));

    let loaded = load_from_file(&LedgerCodec, &path).unwrap();
    assert_eq!(loaded.value.balance_minor, 100);
    assert!(!tracked.is_dirty().unwrap());
}

#[test]
fn test_tracked_autosave_coalesces_rapid_updates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rapid.ledger");
    let scheduler = scheduler(1000);

    let tracked = Tracked::new("rapid", LedgerCodec, Ledger::new("rapid"));
    let log = Arc::new(WriteLog::default());
    tracked.set_listener(log.clone()).unwrap();
    tracked
        .enable_autosave(
            &path,
            &AutosaveConfig::with_delay(Duration::from_millis(100)),
            &scheduler,
        )
        .unwrap();

    for i in 0..50 {
        tracked.update(|l| l.record("cash", i, None)).unwrap();
    }
    // One request for the whole burst.
    assert!(scheduler.pending() <= 1);

    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());
    assert_eq!(log.count(), 1);

    let loaded = load_from_file(&LedgerCodec, &path).unwrap();
    assert_eq!(loaded.value.entries.len(), 50);
    assert!(loaded.consistent);

    // A later change schedules a fresh write.
    tracked.update(|l| l.record("cash", 1, None)).unwrap();
    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());
    assert_eq!(log.count(), 2);
    assert_eq!(
        load_from_file(&LedgerCodec, &path).unwrap().value.entries.len(),
        51
    );
}

#[test]
fn test_explicit_save_supersedes_pending_request() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("explicit.ledger");
    let scheduler = scheduler(1000);

    let tracked = Tracked::new("explicit", LedgerCodec, Ledger::new("explicit"));
    let log = Arc::new(WriteLog::default());
    tracked.set_listener(log.clone()).unwrap();
    tracked
        .enable_autosave(
            &path,
            &AutosaveConfig::with_delay(Duration::from_millis(100)),
            &scheduler,
        )
        .unwrap();

    tracked.update(|l| l.record("cash", 5, None)).unwrap();
    tracked.save_to_file(&path).unwrap();

    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());
    assert_eq!(log.count(), 1);
    assert_eq!(scheduler.stats().requests_skipped, 1);
}

/// Listener whose post-save hook panics.
struct PanicsAfterSave;

impl AutosaveListener for PanicsAfterSave {
    fn on_after_save(&self, _destination: &Path) {
        panic!("listener failed");
    }
}

#[test]
fn test_panicking_listener_does_not_stall_other_ledgers() {
    let dir = tempdir().unwrap();
    let bad_path = dir.path().join("bad.ledger");
    let good_path = dir.path().join("good.ledger");
    let scheduler = scheduler(1000);
    let config = AutosaveConfig::with_delay(Duration::from_millis(10));

    let bad = Tracked::new("bad", LedgerCodec, Ledger::new("bad"));
    bad.set_listener(Arc::new(PanicsAfterSave)).unwrap();
    bad.enable_autosave(&bad_path, &config, &scheduler).unwrap();
    bad.update(|l| l.record("cash", 1, None)).unwrap();
    assert!(scheduler.wait_for_drain(Duration::from_secs(5)).unwrap());

    let good = Tracked::new("good", LedgerCodec, Ledger::new("good"));
    good.enable_autosave(&good_path, &config, &scheduler).unwrap();
    good.update(|l| l.record("cash", 2, None)).unwrap();
    assert!(scheduler.wait_for_drain(Duration::from_secs(5)).unwrap());

    assert_eq!(scheduler.pending(), 0);
    assert_eq!(
        load_from_file(&LedgerCodec, &good_path).unwrap().value.balance_minor,
        2
    );
    assert!(!good.is_dirty().unwrap());

    let stats = scheduler.stats();
    assert_eq!(stats.saves_failed, 1);
    assert_eq!(stats.saves_written, 1);
    // The panic unwound through the bad ledger's lock.
    assert!(bad.is_dirty().is_err());
}

#[test]
fn test_disable_autosave_stops_new_requests() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("off.ledger");
    let scheduler = scheduler(1000);

    let tracked = Tracked::new("off", LedgerCodec, Ledger::new("off"));
    let log = Arc::new(WriteLog::default());
    tracked.set_listener(log.clone()).unwrap();
    tracked
        .enable_autosave(
            &path,
            &AutosaveConfig::with_delay(Duration::from_millis(150)),
            &scheduler,
        )
        .unwrap();

    tracked.update(|l| l.record("cash", 1, None)).unwrap();
    assert!(tracked.has_pending_save().unwrap());
    tracked.disable_autosave().unwrap();
    tracked.update(|l| l.record("cash", 2, None)).unwrap();
    assert_eq!(scheduler.pending(), 1);

    // The request queued before disabling still runs and writes what is
    // there at that moment.
    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());
    assert_eq!(log.count(), 1);
    assert_eq!(
        load_from_file(&LedgerCodec, &path).unwrap().value.entries.len(),
        2
    );

    tracked.update(|l| l.record("cash", 3, None)).unwrap();
    assert_eq!(scheduler.pending(), 0);
    assert!(!tracked.has_pending_save().unwrap());
    assert!(tracked.is_dirty().unwrap());
    thread::sleep(Duration::from_millis(200));
    assert_eq!(log.count(), 1);
}

#[test]
fn test_disabled_config_never_queues() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.ledger");
    let scheduler = scheduler(1000);

    let tracked = Tracked::new("never", LedgerCodec, Ledger::new("never"));
    tracked
        .enable_autosave(&path, &AutosaveConfig::disabled(), &scheduler)
        .unwrap();
    for i in 0..5 {
        tracked.update(|l| l.record("cash", i, None)).unwrap();
    }

    assert_eq!(scheduler.pending(), 0);
    assert!(!scheduler.is_running());
    assert!(tracked.is_dirty().unwrap());
    assert!(!path.exists());
    assert_eq!(scheduler.stats().workers_started, 0);
}

#[test]
fn test_only_one_worker_under_concurrent_registration() {
    // Short idle timeout so workers keep exiting and restarting mid-test.
    let scheduler = scheduler(5);
    let targets: Vec<Arc<FakeTarget>> = (0..64).map(|_| FakeTarget::dirty()).collect();

    let handles: Vec<_> = targets
        .chunks(8)
        .enumerate()
        .map(|(t, chunk)| {
            let scheduler = scheduler.clone();
            let chunk: Vec<Arc<FakeTarget>> = chunk.to_vec();
            thread::spawn(move || {
                for (i, target) in chunk.into_iter().enumerate() {
                    let delay = Duration::from_millis(((t + i) % 4) as u64 * 3);
                    scheduler
                        .register_for_save(target, delay, format!("p-{t}-{i}"))
                        .unwrap();
                    thread::sleep(Duration::from_millis((i % 3) as u64 * 4));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(scheduler.wait_for_drain(Duration::from_secs(10)).unwrap());
    for target in &targets {
        assert_eq!(target.writes.load(Ordering::SeqCst), 1);
    }

    let stats = scheduler.stats();
    assert_eq!(stats.peak_workers, 1);
    assert!(stats.workers_started >= 1);
    assert_eq!(stats.saves_written, 64);
}

#[test]
fn test_registration_racing_idle_shutdown_is_serviced() {
    let idle_ms = 10;
    let scheduler = scheduler(idle_ms);

    for round in 0..30u64 {
        let first = FakeTarget::dirty();
        scheduler
            .register_for_save(first.clone(), Duration::ZERO, "first")
            .unwrap();
        assert!(scheduler.wait_for_drain(Duration::from_secs(5)).unwrap());

        // Land the next registration around the moment the worker gives up.
        thread::sleep(Duration::from_millis(idle_ms - 2 + round % 5));
        let second = FakeTarget::dirty();
        scheduler
            .register_for_save(second.clone(), Duration::ZERO, "second")
            .unwrap();

        assert!(
            scheduler.wait_for_drain(Duration::from_secs(5)).unwrap(),
            "request lost in round {round}"
        );
        assert_eq!(first.writes.load(Ordering::SeqCst), 1);
        assert_eq!(second.writes.load(Ordering::SeqCst), 1);
    }

    assert_eq!(scheduler.stats().peak_workers, 1);
}

#[test]
fn test_worker_restarts_after_idle_exit() {
    let scheduler = scheduler(20);

    let first = FakeTarget::dirty();
    scheduler
        .register_for_save(first.clone(), Duration::ZERO, "a")
        .unwrap();
    assert!(scheduler.wait_for_drain(Duration::from_secs(5)).unwrap());

    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!scheduler.is_running());

    let second = FakeTarget::dirty();
    scheduler
        .register_for_save(second.clone(), Duration::ZERO, "b")
        .unwrap();
    assert!(scheduler.wait_for_drain(Duration::from_secs(5)).unwrap());

    assert_eq!(second.writes.load(Ordering::SeqCst), 1);
    assert!(scheduler.stats().workers_started >= 2);
}
