//! Auto-save functionality for ledgers.
//!
//! Provides:
//! - `AutosaveScheduler` - Shared background worker that coalesces save requests
//! - `Tracked` / `SaveTarget` - Lock-owning values the worker can persist
//! - `DirtyTracker` - Unsaved-change bookkeeping
//! - `AutosaveConfig` / `SchedulerConfig` - Settings

mod config;
mod queue;
mod scheduler;
mod target;
mod tracker;

pub use config::{AutosaveConfig, SchedulerConfig};
pub use scheduler::{AutosaveScheduler, SchedulerStats};
pub use target::{AutosaveListener, SaveTarget, Tracked};
pub use tracker::DirtyTracker;
