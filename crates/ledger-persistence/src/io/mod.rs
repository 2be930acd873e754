//! File I/O operations for ledger persistence.
//!
//! This module handles:
//! - Saving snapshots with atomic writes
//! - Loading snapshots with legacy/primary format sniffing
//! - File digests for change detection

mod hash;
mod load;
mod save;

pub use hash::file_digest;
pub use load::{Loaded, SnapshotFormat, load_from_file, load_from_file_async, load_from_stream};
pub use save::{TEMP_FILE_PREFIX, save_to_file, save_to_file_async, save_to_stream};

pub(crate) use save::save_to_file_with;
