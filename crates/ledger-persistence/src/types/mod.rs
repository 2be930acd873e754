//! Ledger model and snapshot format constants.
//!
//! The ledger derives both rkyv (primary format) and serde (legacy JSON
//! format) so either stream kind can be decoded into the same type.

mod ledger;

pub use ledger::{Ledger, LedgerEntry};

/// Current schema version.
///
/// Increment this when making breaking changes to the persistence format.
/// The loader will reject files with version > CURRENT_SCHEMA_VERSION.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Magic bytes at the start of primary-format snapshots.
///
/// Format: "LDG" + format byte (0x01)
pub const MAGIC_BYTES: [u8; 4] = [b'L', b'D', b'G', 0x01];

/// Leading bytes that route a stream to the legacy decoder.
pub const LEGACY_MAGIC: [u8; 2] = [0xAC, 0xED];

/// Full legacy stream header: magic followed by stream version 5.
pub const LEGACY_HEADER: [u8; 4] = [0xAC, 0xED, 0x00, 0x05];
