//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading entries from WAL file
//! - Iterator functionality
//! - Partial write handling
//! - Empty file handling

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use aptkv::wal::{Operation, WalEntry, WalReader};
use aptkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn write_entries_to_wal(path: &Path, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.serialize().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

fn sample_entries() -> Vec<WalEntry> {
    vec![
        WalEntry::new(1, Operation::Put { key: b"k1".to_vec(), value: b"v1".to_vec() }),
        WalEntry::new(2, Operation::Put { key: b"k2".to_vec(), value: b"v2".to_vec() }),
        WalEntry::new(3, Operation::Delete { key: b"k1".to_vec() }),
    ]
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_read_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();

    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_read_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries = sample_entries();
    write_entries_to_wal(&wal_path, &entries);

    let mut reader = WalReader::open(&wal_path).unwrap();
    for original in &entries {
        assert_eq!(&reader.next_entry().unwrap().unwrap(), original);
    }
    assert!(reader.next_entry().unwrap().is_none());

    let file_len = std::fs::metadata(&wal_path).unwrap().len();
    assert_eq!(reader.position(), file_len);
}

#[test]
fn test_open_missing_file() {
    let (_temp, wal_path) = setup_temp_wal();
    assert!(matches!(WalReader::open(&wal_path), Err(KvError::Io(_))));
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_yields_all_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries = sample_entries();
    write_entries_to_wal(&wal_path, &entries);

    let read: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(read, entries);
}

#[test]
fn test_iterator_stops_after_error() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_to_wal(&wal_path, &sample_entries()[..1]);
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[0u8; 5]).unwrap();
    }

    let results: Vec<_> = WalReader::open(&wal_path).unwrap().entries().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(KvError::WalCorruption(_))));
}

// =============================================================================
// Partial Write Tests
// =============================================================================

#[test]
fn test_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    let entry = WalEntry::new(1, Operation::Put { key: b"k".to_vec(), value: b"v".to_vec() });

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&entry.serialize().unwrap()).unwrap();
    file.write_all(&[0u8; 8]).unwrap();
    file.sync_all().unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    let valid_len = reader.position();

    assert!(matches!(reader.next_entry(), Err(KvError::WalCorruption(_))));
    assert_eq!(reader.position(), valid_len);
}

#[test]
fn test_partial_payload() {
    let (_temp, wal_path) = setup_temp_wal();
    let entry = WalEntry::new(1, Operation::Put { key: b"k".to_vec(), value: b"v".to_vec() });
    let bytes = entry.serialize().unwrap();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&bytes).unwrap();
    // Complete header, missing payload bytes
    file.write_all(&bytes[..20]).unwrap();
    file.sync_all().unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.next_entry().unwrap(), Some(entry));
    assert!(reader.next_entry().is_err());
}
