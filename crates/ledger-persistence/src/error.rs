//! Persistence error types.
//!
//! All persistence operations return structured errors that provide
//! user-friendly messages and optional remediation hints.

use std::path::PathBuf;
use thiserror::Error;

/// Persistence operation error.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File I/O error.
    #[error("Failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on a caller-supplied stream (no backing path).
    #[error("Failed to {operation} snapshot stream")]
    Stream {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Input is not a ledger snapshot.
    #[error("Invalid snapshot format: {reason}")]
    InvalidFormat { reason: String },

    /// Unsupported schema version.
    #[error("Snapshot version {found} is not supported (maximum: {max_supported})")]
    UnsupportedVersion { found: u32, max_supported: u32 },

    /// Payload digest does not match the one stored in the trailer.
    #[error("Snapshot checksum mismatch (expected {expected}, found {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    /// Serialization error.
    #[error("Failed to serialize ledger data")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Deserialization error.
    #[error("Failed to deserialize ledger data")]
    Deserialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The codec has no decoder for the legacy stream format.
    #[error("Legacy snapshot format is not supported by this codec")]
    LegacyUnsupported,

    /// Atomic replace failed (temp file couldn't be renamed).
    #[error("Failed to complete save operation")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The autosave worker thread could not be spawned.
    #[error("Failed to start the autosave worker")]
    WorkerSpawn {
        #[source]
        source: std::io::Error,
    },

    /// A mutex was poisoned by a panicking holder.
    #[error("Lock poisoned: {what}")]
    LockPoisoned { what: &'static str },
}

impl PersistenceError {
    /// Returns true for errors caused by unreadable or corrupt snapshot data,
    /// as opposed to failures of the underlying storage.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat { .. }
                | Self::UnsupportedVersion { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Deserialization { .. }
                | Self::LegacyUnsupported
        )
    }

    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io {
                operation, path, ..
            } => {
                format!("Could not {} the file at {}", operation, path.display())
            }
            Self::Stream { operation, .. } => {
                format!("Could not {} the snapshot stream", operation)
            }
            Self::InvalidFormat { reason } => {
                format!("The data is not a valid ledger snapshot: {}", reason)
            }
            Self::UnsupportedVersion {
                found,
                max_supported,
            } => {
                format!(
                    "This snapshot was written by a newer version \
                    (file version {}, this build supports up to {}).",
                    found, max_supported
                )
            }
            Self::ChecksumMismatch { .. } => {
                "The snapshot is damaged: its contents do not match the stored checksum.".to_string()
            }
            Self::Serialization { .. } => {
                "An error occurred while encoding the ledger.".to_string()
            }
            Self::Deserialization { .. } => {
                "An error occurred while reading the ledger data. The file may be corrupted."
                    .to_string()
            }
            Self::LegacyUnsupported => {
                "This snapshot uses a legacy format that cannot be read here.".to_string()
            }
            Self::AtomicWriteFailed { target_path, .. } => {
                format!(
                    "Could not save the ledger to {}. Please check disk space and permissions.",
                    target_path.display()
                )
            }
            Self::WorkerSpawn { .. } => {
                "The background autosave worker could not be started.".to_string()
            }
            Self::LockPoisoned { what } => {
                format!("Internal state ({}) was left inconsistent by a crash.", what)
            }
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Io { operation, .. } => {
                if *operation == "read" || *operation == "open" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::Stream { .. } => None,
            Self::InvalidFormat { .. } => Some("Make sure you selected a ledger file.".into()),
            Self::UnsupportedVersion { .. } => {
                Some("Upgrade to a release that understands this snapshot version.".into())
            }
            Self::ChecksumMismatch { .. } | Self::Deserialization { .. } => {
                Some("Try opening a backup if you have one.".into())
            }
            Self::Serialization { .. } => None,
            Self::LegacyUnsupported => {
                Some("Convert the file with `ledger migrate` using a codec that reads it.".into())
            }
            Self::AtomicWriteFailed { .. } => {
                Some("Free up disk space or try saving to a different location.".into())
            }
            Self::WorkerSpawn { .. } => {
                Some("Save the ledger explicitly; autosave will retry on the next change.".into())
            }
            Self::LockPoisoned { .. } => Some("Restart the application.".into()),
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_classified() {
        let corrupt = PersistenceError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(corrupt.is_decode_error());

        let io = PersistenceError::Io {
            operation: "write",
            path: PathBuf::from("/tmp/ledger"),
            source: std::io::Error::other("disk full"),
        };
        assert!(!io.is_decode_error());
        assert!(io.suggestion().unwrap().contains("permission to write"));
    }
}
