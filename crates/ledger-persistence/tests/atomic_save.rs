//! Integration tests for the atomic save protocol and loader.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use ledger_persistence::{
    Ledger, LedgerCodec, PersistenceError, Result, SnapshotCodec, TEMP_FILE_PREFIX, file_digest,
    load_from_file, save_to_file,
};
use tempfile::tempdir;

/// Writes the first half of a real snapshot, then fails.
struct HalfWriteCodec;

impl SnapshotCodec for HalfWriteCodec {
    type Value = Ledger;

    fn encode(&self, value: &Ledger, sink: &mut dyn Write) -> Result<()> {
        let mut full = Vec::new();
        LedgerCodec.encode(value, &mut full)?;
        sink.write_all(&full[..full.len() / 2]).unwrap();
        Err(PersistenceError::Serialization {
            source: Box::new(std::io::Error::other("encoder gave up")),
        })
    }

    fn decode(&self, source: &mut dyn Read) -> Result<Ledger> {
        LedgerCodec.decode(source)
    }
}

fn sample(name: &str, postings: i64) -> Ledger {
    let mut ledger = Ledger::new(name);
    for i in 0..postings {
        ledger.record(format!("account-{}", i % 3), i * 100, None);
    }
    ledger
}

fn temp_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(TEMP_FILE_PREFIX))
        .collect()
}

#[test]
fn test_failed_encode_leaves_destination_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.ledger");

    save_to_file(&LedgerCodec, &sample("before", 5), &path).unwrap();
    let before = file_digest(&path).unwrap();

    let err = save_to_file(&HalfWriteCodec, &sample("after", 50), &path).unwrap_err();

    assert!(matches!(err, PersistenceError::Serialization { .. }));
    assert_eq!(file_digest(&path).unwrap(), before);
    assert!(temp_files(dir.path()).is_empty());

    let loaded = load_from_file(&LedgerCodec, &path).unwrap();
    assert_eq!(loaded.value.name, "before");
}

#[test]
fn test_failed_first_save_creates_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never.ledger");

    assert!(save_to_file(&HalfWriteCodec, &sample("x", 3), &path).is_err());

    assert!(!path.exists());
    assert!(temp_files(dir.path()).is_empty());
}

#[test]
fn test_missing_directory_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("books.ledger");

    let err = save_to_file(&LedgerCodec, &sample("x", 1), &path).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Io {
            operation: "create temporary",
            ..
        }
    ));
}

#[test]
fn test_resave_round_trips_latest_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.ledger");

    save_to_file(&LedgerCodec, &sample("v1", 2), &path).unwrap();
    let latest = sample("v2", 20);
    save_to_file(&LedgerCodec, &latest, &path).unwrap();

    let loaded = load_from_file(&LedgerCodec, &path).unwrap();
    assert_eq!(loaded.value, latest);
    assert!(loaded.consistent);
}

#[test]
fn test_corrupt_middle_byte_is_a_decode_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.ledger");
    save_to_file(&LedgerCodec, &sample("corrupt me", 10), &path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] = bytes[middle].wrapping_add(1);
    fs::write(&path, bytes).unwrap();

    let err = load_from_file(&LedgerCodec, &path).unwrap_err();
    assert!(err.is_decode_error(), "unexpected error: {err:?}");
}

#[test]
fn test_inconsistent_ledger_loads_with_warning_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.ledger");

    let mut ledger = sample("skewed", 4);
    ledger.balance_minor += 1;
    save_to_file(&LedgerCodec, &ledger, &path).unwrap();

    let loaded = load_from_file(&LedgerCodec, &path).unwrap();
    assert!(!loaded.consistent);
    assert_eq!(loaded.value, ledger);
}
