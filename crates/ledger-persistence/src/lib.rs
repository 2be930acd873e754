//! Crash-safe persistence for ledgers.
//!
//! This crate writes a ledger to disk so that a crash at any point leaves
//! either the previous snapshot or the new one, never a torn file, and lets
//! frequently-changing ledgers hand their saves to a shared background worker
//! that batches them.
//!
//! # Features
//!
//! - **Atomic writes** via a sibling temp file, `fsync`, and rename
//! - **Format sniffing** between the current envelope and legacy streams
//! - **Corruption detection** with a SHA-256 payload digest
//! - **Auto-save** on one lazily started worker that exits when idle
//!
//! # Example
//!
//! ```ignore
//! use ledger_persistence::{AutosaveConfig, AutosaveScheduler, Ledger, LedgerCodec, Tracked};
//!
//! let ledger = Tracked::new("household", LedgerCodec, Ledger::new("household"));
//! ledger.enable_autosave("household.ledger", &AutosaveConfig::default(), AutosaveScheduler::global())?;
//!
//! // Each change marks the ledger dirty; one write happens ~2s later.
//! ledger.update(|l| l.record("groceries", -4_250, None))?;
//! ledger.update(|l| l.record("salary", 300_000, None))?;
//!
//! // The worker is not waited on at exit.
//! ledger.save_to_file(Path::new("household.ledger"))?;
//! ```
//!
//! # Architecture
//!
//! The crate is organized into:
//!
//! - `types/` - The `Ledger` model and format constants
//! - `codec.rs` - `SnapshotCodec` trait and the default ledger codec
//! - `io/` - Atomic save, sniffing loader, file digests
//! - `autosave/` - Scheduler, tracked targets, dirty tracking, config
//! - `error.rs` - Error types with user-friendly messages

mod autosave;
mod codec;
mod error;
mod io;
mod types;

pub use autosave::{
    AutosaveConfig, AutosaveListener, AutosaveScheduler, DirtyTracker, SaveTarget,
    SchedulerConfig, SchedulerStats, Tracked,
};
pub use codec::{Consistency, LedgerCodec, SnapshotCodec};
pub use error::{PersistenceError, Result};
pub use io::{
    Loaded, SnapshotFormat, TEMP_FILE_PREFIX, file_digest, load_from_file, load_from_file_async,
    load_from_stream, save_to_file, save_to_file_async, save_to_stream,
};
pub use types::{
    CURRENT_SCHEMA_VERSION, LEGACY_HEADER, LEGACY_MAGIC, Ledger, LedgerEntry, MAGIC_BYTES,
};
