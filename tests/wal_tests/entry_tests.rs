//! Tests for WAL entry framing
//!
//! These tests verify:
//! - Frames decode back to the entry that produced them
//! - CRC, length and LSN checks reject damaged frames
//! - Batch operations keep their inner order

use aptkv::wal::{Operation, WalEntry, HEADER_SIZE};
use aptkv::KvError;

fn put(key: &[u8], value: &[u8]) -> Operation {
    Operation::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_frame_decodes_to_same_entry() {
    let entry = WalEntry::new(7, put(b"Pamd64 hello 2.10", b"stanza"));

    let bytes = entry.serialize().unwrap();
    let recovered = WalEntry::deserialize(&bytes).unwrap();

    assert_eq!(recovered, entry);
}

#[test]
fn test_frame_header_layout() {
    let entry = WalEntry::new(0x0102_0304, Operation::Delete { key: b"k".to_vec() });
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &0x0102_0304u64.to_le_bytes());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    assert_eq!(bytes.len(), HEADER_SIZE + len as usize);
    assert_eq!(WalEntry::frame_len(len), bytes.len() as u64);
}

#[test]
fn test_batch_preserves_order() {
    let batch = Operation::Batch(vec![
        put(b"b", b"2"),
        Operation::Delete { key: b"a".to_vec() },
        put(b"a", b"1"),
    ]);
    let entry = WalEntry::new(3, batch.clone());

    let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();

    assert_eq!(recovered.operation, batch);
    assert_eq!(
        recovered.operation.keys(),
        vec![b"b".as_slice(), b"a".as_slice(), b"a".as_slice()]
    );
}

#[test]
fn test_binary_key_and_empty_value() {
    let entry = WalEntry::new(1, put(&[0x00, 0x80, 0xFF], b""));
    let recovered = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();
    assert_eq!(recovered, entry);
}

// =============================================================================
// Corruption Detection Tests
// =============================================================================

#[test]
fn test_payload_corruption_detected() {
    let entry = WalEntry::new(1, put(b"key", b"value"));
    let mut bytes = entry.serialize().unwrap();

    if let Some(byte) = bytes.last_mut() {
        *byte ^= 0xFF;
    }

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(KvError::WalCorruption(_))));
}

#[test]
fn test_crc_field_corruption_detected() {
    let entry = WalEntry::new(1, put(b"key", b"value"));
    let mut bytes = entry.serialize().unwrap();

    bytes[8] ^= 0xFF;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(KvError::WalCorruption(_))
    ));
}

#[test]
fn test_lsn_mismatch_detected() {
    let entry = WalEntry::new(5, put(b"key", b"value"));
    let mut bytes = entry.serialize().unwrap();

    // Header LSN no longer matches the payload's
    bytes[0] = 6;

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(KvError::WalCorruption(_))
    ));
}

#[test]
fn test_truncated_frame_rejected() {
    let bytes = WalEntry::new(1, Operation::Delete { key: b"key".to_vec() })
        .serialize()
        .unwrap();

    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE + 2]).is_err());
    assert!(WalEntry::deserialize(&bytes[..10]).is_err());
    assert!(WalEntry::deserialize(&[]).is_err());
}

#[test]
fn test_oversized_length_rejected() {
    let mut bytes = WalEntry::new(1, put(b"k", b"v")).serialize().unwrap();
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());

    assert!(matches!(
        WalEntry::deserialize(&bytes),
        Err(KvError::WalCorruption(_))
    ));
}
