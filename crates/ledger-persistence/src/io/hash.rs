//! File digests, used to tell whether a snapshot on disk has changed.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{PersistenceError, Result};

/// SHA-256 of a file's contents as lowercase hex.
pub fn file_digest(path: &Path) -> Result<String> {
    let read_failed = |e| PersistenceError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_failed)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_failed)?;

    Ok(hex::encode(hasher.finalize()))
}
