//! Batch behaviour through the storage handle

use aptkv::{Batch, KvError, KvStore, Reader, Storage, Writer};
use tempfile::TempDir;

use super::{setup_temp_store, store_config};

#[test]
fn test_batch_applies_operations_in_order() {
    let (_temp, store) = setup_temp_store();
    store.put(b"old", b"x").unwrap();
    let batch = store.create_batch().unwrap();

    batch.put(b"k", b"first").unwrap();
    batch.delete(b"k").unwrap();
    batch.put(b"k2", b"first").unwrap();
    batch.put(b"k2", b"second").unwrap();
    batch.delete(b"old").unwrap();
    assert_eq!(batch.len(), 5);

    batch.write().unwrap();

    assert!(matches!(store.get(b"k"), Err(KvError::NotFound)));
    assert_eq!(store.get(b"k2").unwrap(), b"second".to_vec());
    assert!(matches!(store.get(b"old"), Err(KvError::NotFound)));
}

#[test]
fn test_batch_closed_after_write() {
    let (_temp, store) = setup_temp_store();
    let batch = store.create_batch().unwrap();
    batch.put(b"k", b"v").unwrap();
    batch.write().unwrap();

    assert!(batch.is_closed());
    assert!(matches!(batch.put(b"k2", b"v"), Err(KvError::BatchClosed)));
    assert!(matches!(batch.delete(b"k"), Err(KvError::BatchClosed)));
    assert!(matches!(batch.write(), Err(KvError::BatchClosed)));

    assert_eq!(store.get(b"k").unwrap(), b"v".to_vec());
    assert!(matches!(store.get(b"k2"), Err(KvError::NotFound)));
}

#[test]
fn test_dropped_batch_has_no_effect() {
    let (_temp, store) = setup_temp_store();
    {
        let batch = store.create_batch().unwrap();
        batch.put(b"k", b"v").unwrap();
        batch.delete(b"other").unwrap();
    }
    store.put(b"other", b"kept").unwrap();

    assert!(matches!(store.get(b"k"), Err(KvError::NotFound)));
    assert_eq!(store.get(b"other").unwrap(), b"kept".to_vec());
    assert_eq!(store.stats().unwrap().last_sequence, 1);
}

#[test]
fn test_empty_batch_write() {
    let (_temp, store) = setup_temp_store();
    let batch = store.create_batch().unwrap();

    assert!(batch.is_empty());
    batch.write().unwrap();

    assert!(batch.is_closed());
    assert_eq!(store.stats().unwrap().last_sequence, 0);
}

#[test]
fn test_written_batch_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = store_config(temp_dir.path());
    {
        let store = KvStore::open_with(config.clone()).unwrap();
        let batch = store.create_batch().unwrap();
        for i in 0..50 {
            batch
                .put(format!("Spkg{:02}", i).as_bytes(), b"snapshot")
                .unwrap();
        }
        batch.write().unwrap();
        // Handle dropped without close: the batch only lives in the WAL
    }

    let store = KvStore::open_with(config).unwrap();
    for i in 0..50 {
        assert_eq!(
            store.get(format!("Spkg{:02}", i).as_bytes()).unwrap(),
            b"snapshot".to_vec()
        );
    }
}
