//! Snapshot codecs.
//!
//! A [`SnapshotCodec`] turns a value into bytes and back. The save and load
//! paths in [`crate::io`] only ever talk to this trait, so the wire format is
//! swappable without touching the atomic-write or format-sniffing logic.
//!
//! # Primary format
//!
//! ```text
//! +------------------+
//! | Magic: "LDG\x01" | 4 bytes - file identification
//! +------------------+
//! | Version: 1       | 4 bytes - u32 little-endian schema version
//! +------------------+
//! | Payload length   | 8 bytes - u64 little-endian
//! +------------------+
//! | rkyv Payload     | Variable
//! +------------------+
//! | SHA-256          | 32 bytes - digest of the payload
//! +------------------+
//! ```
//!
//! # Legacy format
//!
//! `AC ED 00 05` followed by a JSON document. Decode only.

use std::io::{Read, Write};

use rkyv::util::AlignedVec;
use sha2::{Digest, Sha256};

use crate::error::{PersistenceError, Result};
use crate::types::{CURRENT_SCHEMA_VERSION, LEGACY_HEADER, Ledger, MAGIC_BYTES};

const HEADER_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Self-check run on every value after it is loaded.
pub trait Consistency {
    /// Returns false if the value's internal invariants do not hold.
    fn is_consistent(&self) -> bool;
}

/// Encoder/decoder for one snapshot value type.
pub trait SnapshotCodec: Send + Sync {
    /// The value this codec persists.
    type Value: Consistency + Send + 'static;

    /// Write a complete snapshot of `value` to `sink`.
    fn encode(&self, value: &Self::Value, sink: &mut dyn Write) -> Result<()>;

    /// Read a primary-format snapshot from `source`.
    fn decode(&self, source: &mut dyn Read) -> Result<Self::Value>;

    /// Read a legacy-format snapshot. `source` starts at the legacy magic.
    fn decode_legacy(&self, source: &mut dyn Read) -> Result<Self::Value> {
        let _ = source;
        Err(PersistenceError::LegacyUnsupported)
    }
}

/// The default codec for [`Ledger`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerCodec;

impl SnapshotCodec for LedgerCodec {
    type Value = Ledger;

    fn encode(&self, value: &Ledger, sink: &mut dyn Write) -> Result<()> {
        let payload = rkyv::to_bytes::<rkyv::rancor::Error>(value).map_err(|e| {
            PersistenceError::Serialization {
                source: Box::new(std::io::Error::other(format!(
                    "rkyv serialization failed: {e}"
                ))),
            }
        })?;
        let digest = Sha256::digest(&payload);

        write_all(sink, &MAGIC_BYTES)?;
        write_all(sink, &CURRENT_SCHEMA_VERSION.to_le_bytes())?;
        write_all(sink, &(payload.len() as u64).to_le_bytes())?;
        write_all(sink, &payload)?;
        write_all(sink, &digest)
    }

    fn decode(&self, source: &mut dyn Read) -> Result<Ledger> {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|e| PersistenceError::Stream {
                operation: "read",
                source: e,
            })?;

        let payload = verified_payload(&bytes)?;

        // rkyv needs the archive aligned; the payload sits at an arbitrary
        // offset inside `bytes`.
        let mut aligned: AlignedVec = AlignedVec::with_capacity(payload.len());
        aligned.extend_from_slice(payload);

        rkyv::from_bytes::<Ledger, rkyv::rancor::Error>(&aligned).map_err(|e| {
            PersistenceError::Deserialization {
                source: Box::new(std::io::Error::other(format!(
                    "rkyv deserialization failed: {e}"
                ))),
            }
        })
    }

    fn decode_legacy(&self, source: &mut dyn Read) -> Result<Ledger> {
        let mut header = [0u8; 4];
        source
            .read_exact(&mut header)
            .map_err(|e| PersistenceError::InvalidFormat {
                reason: format!("truncated legacy header: {e}"),
            })?;
        if header != LEGACY_HEADER {
            return Err(PersistenceError::InvalidFormat {
                reason: "unrecognized legacy stream version".to_string(),
            });
        }

        serde_json::from_reader(source).map_err(|e| PersistenceError::Deserialization {
            source: Box::new(e),
        })
    }
}

/// Validate the envelope and return the payload slice.
fn verified_payload(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_LEN + DIGEST_LEN {
        return Err(PersistenceError::InvalidFormat {
            reason: "input too small".to_string(),
        });
    }

    if bytes[0..4] != MAGIC_BYTES {
        return Err(PersistenceError::InvalidFormat {
            reason: "not a ledger snapshot (invalid magic bytes)".to_string(),
        });
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: version,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
    let declared = u64::from_le_bytes(len_bytes);
    let available = (bytes.len() - HEADER_LEN - DIGEST_LEN) as u64;
    if declared != available {
        return Err(PersistenceError::InvalidFormat {
            reason: format!("payload length {declared} does not match {available} bytes present"),
        });
    }

    let (payload, trailer) = bytes[HEADER_LEN..].split_at(bytes.len() - HEADER_LEN - DIGEST_LEN);
    let actual = Sha256::digest(payload);
    if actual.as_slice() != trailer {
        return Err(PersistenceError::ChecksumMismatch {
            expected: hex::encode(trailer),
            actual: hex::encode(actual),
        });
    }

    Ok(payload)
}

fn write_all(sink: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    sink.write_all(bytes).map_err(|e| PersistenceError::Stream {
        operation: "write",
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ledger {
        let mut ledger = Ledger::new("codec");
        ledger.record("cash", 1_000, None);
        ledger.record("card", -250, Some("coffee".into()));
        ledger
    }

    fn encoded(ledger: &Ledger) -> Vec<u8> {
        let mut bytes = Vec::new();
        LedgerCodec.encode(ledger, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_round_trip() {
        let ledger = sample();
        let bytes = encoded(&ledger);
        assert_eq!(&bytes[0..4], &MAGIC_BYTES);

        let decoded = LedgerCodec.decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, ledger);
        assert_eq!(decoded.is_consistent(), ledger.is_consistent());
    }

    #[test]
    fn test_flipped_payload_byte_is_rejected() {
        let mut bytes = encoded(&sample());
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x5A;

        let err = LedgerCodec.decode(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PersistenceError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let bytes = encoded(&sample());
        let truncated = &bytes[..bytes.len() - 1];

        let err = LedgerCodec.decode(&mut &truncated[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidFormat { .. }));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let mut bytes = encoded(&sample());
        bytes[4..8].copy_from_slice(&999u32.to_le_bytes());

        let err = LedgerCodec.decode(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::UnsupportedVersion { found: 999, .. }
        ));
    }

    #[test]
    fn test_legacy_json_decodes() {
        let ledger = sample();
        let mut bytes = LEGACY_HEADER.to_vec();
        bytes.extend_from_slice(&serde_json::to_vec(&ledger).unwrap());

        let decoded = LedgerCodec.decode_legacy(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, ledger);
    }

    #[test]
    fn test_legacy_wrong_stream_version() {
        let bytes = [0xAC, 0xED, 0x00, 0x04, b'{', b'}'];
        let err = LedgerCodec.decode_legacy(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidFormat { .. }));
    }
}
