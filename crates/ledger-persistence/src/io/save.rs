//! Snapshot saving operations.
//!
//! [`save_to_file`] never leaves a partially written destination behind:
//! the snapshot is written to a sibling temp file, synced, and renamed over
//! the destination. Any failure before the rename leaves the destination
//! exactly as it was.
//!
//! `sync_all` asks the OS to push the data to the device. Drive write
//! caches may still hold it for a few seconds; this is the best a process
//! can do.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, PathPersistError, TempPath};

use crate::codec::SnapshotCodec;
use crate::error::{PersistenceError, Result};

/// Prefix of the temporary files created next to the destination.
pub const TEMP_FILE_PREFIX: &str = "ledger.tempsave";

/// Encode a snapshot straight into `sink`.
///
/// For callers that manage their own destination. The caller is responsible
/// for holding whatever lock guards `value`.
pub fn save_to_stream<C: SnapshotCodec>(
    codec: &C,
    value: &C::Value,
    sink: &mut dyn Write,
) -> Result<()> {
    codec.encode(value, sink)?;
    sink.flush().map_err(|e| PersistenceError::Stream {
        operation: "flush",
        source: e,
    })
}

/// Save a snapshot to `destination` atomically.
///
/// Uses atomic write (temp file + rename) to prevent data corruption
/// on crash or power loss.
pub fn save_to_file<C: SnapshotCodec>(codec: &C, value: &C::Value, destination: &Path) -> Result<()> {
    save_to_file_with(codec, value, destination, |_| {})
}

/// Save a snapshot asynchronously.
///
/// Spawns the save operation on a blocking thread pool to avoid
/// blocking the async runtime.
pub async fn save_to_file_async<C>(codec: C, value: C::Value, destination: PathBuf) -> Result<()>
where
    C: SnapshotCodec + 'static,
{
    tokio::task::spawn_blocking(move || save_to_file(&codec, &value, &destination))
        .await
        .map_err(|e| PersistenceError::Serialization {
            source: Box::new(e),
        })?
}

/// Like [`save_to_file`], calling `before_write` with the temp file path
/// once it exists and before any snapshot bytes are written.
pub(crate) fn save_to_file_with<C, F>(
    codec: &C,
    value: &C::Value,
    destination: &Path,
    before_write: F,
) -> Result<()>
where
    C: SnapshotCodec,
    F: FnOnce(&Path),
{
    let destination = std::path::absolute(destination).map_err(|e| PersistenceError::Io {
        operation: "resolve",
        path: destination.to_path_buf(),
        source: e,
    })?;
    let directory = destination.parent().ok_or_else(|| PersistenceError::Io {
        operation: "resolve",
        path: destination.clone(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "destination has no parent directory",
        ),
    })?;

    // Same directory as the destination so the final rename never crosses
    // a filesystem boundary.
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(".tmp")
        .tempfile_in(directory)
        .map_err(|e| PersistenceError::Io {
            operation: "create temporary",
            path: directory.to_path_buf(),
            source: e,
        })?;

    before_write(temp.path());

    let written = write_synced(codec, value, &mut temp);
    // Closes the handle; the path is still removed if dropped.
    let temp_path = temp.into_temp_path();
    if let Err(e) = written {
        discard_temp(temp_path);
        return Err(e);
    }

    replace_destination(temp_path, &destination)?;

    tracing::info!("Saved ledger snapshot to {}", destination.display());
    Ok(())
}

fn write_synced<C: SnapshotCodec>(
    codec: &C,
    value: &C::Value,
    temp: &mut NamedTempFile,
) -> Result<()> {
    let path = temp.path().to_path_buf();
    let file: &mut File = temp.as_file_mut();

    let mut writer = BufWriter::new(&mut *file);
    codec.encode(value, &mut writer)?;
    writer.flush().map_err(|e| PersistenceError::Io {
        operation: "flush",
        path: path.clone(),
        source: e,
    })?;
    drop(writer);

    file.sync_all().map_err(|e| PersistenceError::Io {
        operation: "sync",
        path,
        source: e,
    })
}

#[cfg(not(windows))]
fn replace_destination(temp_path: TempPath, destination: &Path) -> Result<()> {
    // rename(2) replaces an existing destination atomically.
    temp_path
        .persist(destination)
        .map_err(|err| rename_failed(err, destination))
}

#[cfg(windows)]
fn replace_destination(temp_path: TempPath, destination: &Path) -> Result<()> {
    let err = match temp_path.persist(destination) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    // Rename-over was refused (typically a sharing violation). Remove the
    // old snapshot and retry; if the retry fails the old file is gone.
    tracing::warn!(
        path = %destination.display(),
        error = %err.error,
        "Replace-on-rename refused, removing destination first"
    );
    let canonical = std::fs::canonicalize(destination).unwrap_or_else(|_| destination.to_path_buf());
    match std::fs::remove_file(&canonical) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            discard_temp(err.path);
            return Err(PersistenceError::Io {
                operation: "remove",
                path: canonical,
                source: e,
            });
        }
    }

    err.path
        .persist(&canonical)
        .map_err(|err| rename_failed(err, &canonical))
}

fn rename_failed(err: PathPersistError, destination: &Path) -> PersistenceError {
    let PathPersistError { error, path } = err;
    let temp_path = path.to_path_buf();
    discard_temp(path);
    PersistenceError::AtomicWriteFailed {
        temp_path,
        target_path: destination.to_path_buf(),
        source: error,
    }
}

/// Best-effort removal of a temp file after a failed save.
fn discard_temp(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    match temp_path.close() {
        Ok(()) => tracing::warn!("Deleted temp file {} after failed save", path.display()),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Could not delete temp file after failed save"
        ),
    }
}
