//! Save targets: values the autosave worker can persist.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::config::AutosaveConfig;
use super::scheduler::AutosaveScheduler;
use super::tracker::DirtyTracker;
use crate::codec::SnapshotCodec;
use crate::error::{PersistenceError, Result};
use crate::io::{save_to_file_with, save_to_stream};

/// Something the autosave worker can write to disk.
///
/// Implementations own their lock and dirty state. The worker only ever
/// asks "save yourself if you still need it".
pub trait SaveTarget: Send + Sync {
    /// Lock the target and, if it still has unsaved changes, write it to
    /// `destination` with the lock held for the whole check-then-write.
    ///
    /// Returns `Ok(false)` without touching the filesystem when the target
    /// is already clean.
    fn save_if_dirty(&self, destination: &Path) -> Result<bool>;

    /// Short name for log lines.
    fn describe(&self) -> String;
}

/// Hooks around automatic and explicit file saves.
///
/// All methods run with the target locked.
pub trait AutosaveListener: Send + Sync {
    /// The temp file exists but nothing has been written to it yet.
    /// Adjust permissions here if needed.
    fn on_before_save(&self, _temp_path: &Path) {}

    /// The snapshot has been renamed into place.
    fn on_after_save(&self, _destination: &Path) {}

    /// The save failed. The target stays dirty.
    fn on_save_failed(&self, _error: &PersistenceError) {}
}

#[derive(Clone)]
struct AutosaveBinding {
    destination: PathBuf,
    delay: Duration,
    scheduler: AutosaveScheduler,
}

struct TrackedState<T> {
    value: T,
    tracker: DirtyTracker,
    autosave: Option<AutosaveBinding>,
    listener: Option<Arc<dyn AutosaveListener>>,
}

/// A value guarded by its own lock, with dirty tracking and optional
/// autosave.
///
/// ```ignore
/// let ledger = Tracked::new("household", LedgerCodec, Ledger::new("household"));
/// ledger.enable_autosave("household.ledger", &AutosaveConfig::default(), AutosaveScheduler::global())?;
/// ledger.update(|l| l.record("rent", -120_000, None))?;
/// ```
pub struct Tracked<C: SnapshotCodec> {
    name: String,
    codec: C,
    state: Mutex<TrackedState<C::Value>>,
}

impl<C: SnapshotCodec + 'static> Tracked<C> {
    pub fn new(name: impl Into<String>, codec: C, value: C::Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            codec,
            state: Mutex::new(TrackedState {
                value,
                tracker: DirtyTracker::new(),
                autosave: None,
                listener: None,
            }),
        })
    }

    /// Save to `destination` after changes, `config.delay()` after the first
    /// unsaved one. A zero delay saves synchronously inside [`update`](Self::update).
    ///
    /// A disabled config turns autosave off.
    pub fn enable_autosave(
        &self,
        destination: impl Into<PathBuf>,
        config: &AutosaveConfig,
        scheduler: &AutosaveScheduler,
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.autosave = config.enabled.then(|| AutosaveBinding {
            destination: destination.into(),
            delay: config.delay(),
            scheduler: scheduler.clone(),
        });
        Ok(())
    }

    /// Stop queueing saves on change. A request already queued still runs
    /// and writes the value if it is dirty by then.
    pub fn disable_autosave(&self) -> Result<()> {
        self.lock()?.autosave = None;
        Ok(())
    }

    pub fn set_listener(&self, listener: Arc<dyn AutosaveListener>) -> Result<()> {
        self.lock()?.listener = Some(listener);
        Ok(())
    }

    /// Mutate the value and mark it dirty.
    ///
    /// With autosave enabled this queues at most one request until the
    /// worker picks it up; later changes ride along with that write.
    ///
    /// The mutation is always kept and its result returned. A failed
    /// zero-delay save or a worker that cannot start is logged and reported
    /// to the listener; the value stays dirty and the next change retries.
    /// `Err` only means the lock was poisoned and `mutate` never ran.
    pub fn update<R>(self: &Arc<Self>, mutate: impl FnOnce(&mut C::Value) -> R) -> Result<R> {
        let mut state = self.lock()?;
        let result = mutate(&mut state.value);
        state.tracker.mark_dirty();

        let Some(binding) = state.autosave.clone() else {
            return Ok(result);
        };

        if binding.delay.is_zero() {
            if let Err(e) = self.write_locked(&mut state, &binding.destination) {
                tracing::error!(
                    ledger = %self.name,
                    path = %binding.destination.display(),
                    error = %e,
                    "Immediate autosave failed"
                );
            }
        } else if state.tracker.request_save() {
            let target: Arc<dyn SaveTarget> = Arc::clone(self) as Arc<dyn SaveTarget>;
            if let Err(e) =
                binding
                    .scheduler
                    .register_for_save(target, binding.delay, binding.destination)
            {
                // The request is queued; the next registration retries startup.
                tracing::error!(
                    ledger = %self.name,
                    error = %e,
                    "Could not start autosave worker"
                );
                if let Some(listener) = &state.listener {
                    listener.on_save_failed(&e);
                }
            }
        }

        Ok(result)
    }

    /// Read the value under the lock.
    pub fn read<R>(&self, inspect: impl FnOnce(&C::Value) -> R) -> Result<R> {
        Ok(inspect(&self.lock()?.value))
    }

    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.lock()?.tracker.is_dirty())
    }

    /// Whether an autosave request is queued and not yet picked up.
    pub fn has_pending_save(&self) -> Result<bool> {
        Ok(self.lock()?.tracker.has_pending_request())
    }

    /// Write a snapshot to `destination` now and clear the dirty flag.
    pub fn save_to_file(&self, destination: &Path) -> Result<()> {
        let mut state = self.lock()?;
        self.write_locked(&mut state, destination)
    }

    /// Encode the current value into `sink`. Leaves the dirty flag alone.
    pub fn save_to_stream(&self, sink: &mut dyn Write) -> Result<()> {
        let state = self.lock()?;
        save_to_stream(&self.codec, &state.value, sink)
    }

    fn write_locked(&self, state: &mut TrackedState<C::Value>, destination: &Path) -> Result<()> {
        let listener = state.listener.clone();
        let written = save_to_file_with(&self.codec, &state.value, destination, |temp| {
            if let Some(listener) = &listener {
                listener.on_before_save(temp);
            }
        });

        match written {
            Ok(()) => {
                state.tracker.clear();
                if let Some(listener) = &listener {
                    listener.on_after_save(destination);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(listener) = &listener {
                    listener.on_save_failed(&e);
                }
                Err(e)
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackedState<C::Value>>> {
        self.state.lock().map_err(|_| PersistenceError::LockPoisoned {
            what: "tracked ledger",
        })
    }
}

impl<C: SnapshotCodec + 'static> SaveTarget for Tracked<C> {
    fn save_if_dirty(&self, destination: &Path) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.tracker.try_claim_dirty() {
            return Ok(false);
        }
        tracing::debug!(
            ledger = %self.name,
            unsaved_ms = state.tracker.ms_since_first_unsaved(),
            quiet_ms = state.tracker.ms_since_last_change(),
            "Writing dirty ledger"
        );
        self.write_locked(&mut state, destination)?;
        Ok(true)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
