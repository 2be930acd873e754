//! Snapshot loading operations.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::codec::{Consistency, SnapshotCodec};
use crate::error::{PersistenceError, Result};
use crate::types::LEGACY_MAGIC;

/// Stream format, decided from the first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// Current envelope, decoded by [`SnapshotCodec::decode`].
    Primary,
    /// Older `0xAC 0xED` stream, decoded by [`SnapshotCodec::decode_legacy`].
    Legacy,
}

impl SnapshotFormat {
    /// Route a stream by its leading bytes.
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&LEGACY_MAGIC) {
            Self::Legacy
        } else {
            Self::Primary
        }
    }
}

/// A decoded snapshot together with what the loader learned about it.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub format: SnapshotFormat,
    /// Result of [`Consistency::is_consistent`]. An inconsistent value is
    /// still returned; what to do about it is the caller's call.
    pub consistent: bool,
}

/// Load a snapshot from any reader.
///
/// The two sniffed bytes are replayed in front of the remaining input, so
/// the chosen decoder sees the stream from its very first byte.
pub fn load_from_stream<C, R>(codec: &C, source: R) -> Result<Loaded<C::Value>>
where
    C: SnapshotCodec,
    R: Read,
{
    let mut source = source;
    let mut head = [0u8; 2];
    let filled = read_head(&mut source, &mut head)?;
    let format = SnapshotFormat::sniff(&head[..filled]);

    let mut stream = (&head[..filled]).chain(source);
    let value = match format {
        SnapshotFormat::Primary => codec.decode(&mut stream)?,
        SnapshotFormat::Legacy => codec.decode_legacy(&mut stream)?,
    };

    let consistent = value.is_consistent();
    if !consistent {
        tracing::warn!(?format, "Loaded an inconsistent ledger");
    }

    Ok(Loaded {
        value,
        format,
        consistent,
    })
}

/// Load a snapshot from a file.
pub fn load_from_file<C: SnapshotCodec>(codec: &C, path: &Path) -> Result<Loaded<C::Value>> {
    let file = File::open(path).map_err(|e| PersistenceError::Io {
        operation: "open",
        path: path.to_path_buf(),
        source: e,
    })?;

    let loaded = load_from_stream(codec, BufReader::new(file))?;
    tracing::info!(
        format = ?loaded.format,
        "Loaded ledger snapshot from {}",
        path.display()
    );
    Ok(loaded)
}

/// Load a snapshot asynchronously.
///
/// Spawns the load operation on a blocking thread pool to avoid
/// blocking the async runtime.
pub async fn load_from_file_async<C>(codec: C, path: PathBuf) -> Result<Loaded<C::Value>>
where
    C: SnapshotCodec + 'static,
{
    tokio::task::spawn_blocking(move || load_from_file(&codec, &path))
        .await
        .map_err(|e| PersistenceError::Deserialization {
            source: Box::new(e),
        })?
}

/// Fill `head` as far as the input allows; short only at end of input.
fn read_head<R: Read>(source: &mut R, head: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match source.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(PersistenceError::Stream {
                    operation: "read",
                    source: e,
                });
            }
        }
    }
    Ok(filled)
}
