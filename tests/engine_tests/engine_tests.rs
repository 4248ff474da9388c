//! Tests for Engine
//!
//! These tests verify:
//! - Point reads, writes and tombstones
//! - Atomic batch writes
//! - Flush to SSTable and compaction
//! - Crash recovery from WAL
//! - Directory locking and repair
//! - Concurrent access patterns

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use aptkv::config::{Config, WalSyncStrategy};
use aptkv::engine::Engine;
use aptkv::wal::Operation;
use aptkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(dir: &Path, memtable_limit: usize) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_size_limit(memtable_limit)
        .build()
}

fn open_engine(dir: &Path) -> Engine {
    Engine::open(config_for(dir, 1024 * 1024)).unwrap()
}

/// Engine whose memtable flushes after a couple of writes
fn open_tiny_engine(dir: &Path) -> Engine {
    Engine::open(config_for(dir, 100)).unwrap()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path());
    (temp_dir, engine)
}

fn put(key: &[u8], value: &[u8]) -> Operation {
    Operation::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn package_key(i: usize) -> Vec<u8> {
    format!("Pamd64 pkg{:03} 1.0", i).into_bytes()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_lays_out_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("db");

    let engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    for file in ["LOCK", "wal.log", "sstables/MANIFEST"] {
        assert!(data_dir.join(file).is_file(), "{} missing", file);
    }
    assert_eq!(engine.data_dir(), data_dir);
    assert_eq!(engine.storage_dir(), data_dir.join("sstables"));
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();

    let result = Engine::open(config_for(temp_dir.path(), 0));

    assert!(matches!(result, Err(KvError::Config(_))));
}

#[test]
fn test_second_open_is_locked_out() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path());

    let second = Engine::open(config_for(temp_dir.path(), 1024));
    assert!(matches!(second, Err(KvError::LockHeld(ref dir)) if dir == temp_dir.path()));
    assert!(matches!(Engine::repair(temp_dir.path()), Err(KvError::LockHeld(_))));

    engine.close().unwrap();
    open_engine(temp_dir.path());
}

// =============================================================================
// Read / Write Tests
// =============================================================================

#[test]
fn test_put_get_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.get(b"Rdebian").unwrap(), None);

    engine.put(b"Rdebian", b"bookworm").unwrap();
    assert_eq!(engine.get(b"Rdebian").unwrap(), Some(b"bookworm".to_vec()));

    engine.put(b"Rdebian", b"trixie").unwrap();
    assert_eq!(engine.get(b"Rdebian").unwrap(), Some(b"trixie".to_vec()));
}

#[test]
fn test_delete_is_idempotent() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"Lrepo", b"local").unwrap();

    engine.delete(b"Lrepo").unwrap();
    engine.delete(b"Lrepo").unwrap();
    engine.delete(b"Lnever").unwrap();

    assert_eq!(engine.get(b"Lrepo").unwrap(), None);
    assert_eq!(engine.get(b"Lnever").unwrap(), None);
}

#[test]
fn test_tombstone_shadows_flushed_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"Sweekly", b"snapshot").unwrap();
    engine.flush().unwrap();
    engine.delete(b"Sweekly").unwrap();
    assert_eq!(engine.get(b"Sweekly").unwrap(), None);

    // Tombstone now lives in a newer table than the value
    engine.flush().unwrap();
    assert_eq!(engine.sstable_count(), 2);
    assert_eq!(engine.get(b"Sweekly").unwrap(), None);
}

#[test]
fn test_unusual_keys_and_values() {
    let (_temp, engine) = setup_temp_engine();
    let big = vec![0xAB; 100_000];
    let binary_key = b"\x00\x01\x02\xFF\xFE";

    engine.put(b"", b"empty key").unwrap();
    engine.put(b"empty value", b"").unwrap();
    engine.put(b"big", &big).unwrap();
    engine.put(binary_key, b"\xFF\x00\xAB").unwrap();

    for round in 0..2 {
        assert_eq!(engine.get(b"").unwrap(), Some(b"empty key".to_vec()), "round {}", round);
        assert_eq!(engine.get(b"empty value").unwrap(), Some(Vec::new()));
        assert_eq!(engine.get(b"big").unwrap(), Some(big.clone()));
        assert_eq!(engine.get(binary_key).unwrap(), Some(b"\xFF\x00\xAB".to_vec()));
        // Second round reads the same data back from a table
        engine.flush().unwrap();
    }
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_write_batch_is_one_group() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"stale", b"x").unwrap();

    engine
        .write_batch(vec![
            put(b"a", b"1"),
            put(b"a", b"2"),
            put(b"b", b"1"),
            Operation::Delete { key: b"stale".to_vec() },
        ])
        .unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"stale").unwrap(), None);
    assert_eq!(engine.stats().last_sequence, 2);
}

#[test]
fn test_empty_batch_writes_nothing() {
    let (_temp, engine) = setup_temp_engine();

    engine.write_batch(Vec::new()).unwrap();

    assert_eq!(engine.stats(), Default::default());
}

#[test]
fn test_torn_batch_is_not_recovered() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path());
        engine.put(b"before", b"kept").unwrap();
        engine
            .write_batch(vec![put(b"b1", b"v"), put(b"b2", b"v"), put(b"b3", b"v")])
            .unwrap();
        // No close: the process "dies" here
    }

    // Lose the end of the batch record
    let wal = temp_dir.path().join("wal.log");
    let file = OpenOptions::new().write(true).open(&wal).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 3).unwrap();
    drop(file);

    let engine = open_engine(temp_dir.path());

    assert_eq!(engine.get(b"before").unwrap(), Some(b"kept".to_vec()));
    for key in [b"b1", b"b2", b"b3"] {
        assert_eq!(engine.get(key).unwrap(), None);
    }
}

// =============================================================================
// Flush / Compaction Tests
// =============================================================================

#[test]
fn test_manual_flush_moves_memtable_to_table() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"Pi386 hello 2.10", b"stanza").unwrap();

    engine.flush().unwrap();
    assert_eq!((engine.memtable_entry_count(), engine.sstable_count()), (0, 1));
    assert_eq!(engine.get(b"Pi386 hello 2.10").unwrap(), Some(b"stanza".to_vec()));

    // Nothing left to flush
    engine.flush().unwrap();
    assert_eq!(engine.sstable_count(), 1);
}

#[test]
fn test_memtable_limit_triggers_flush() {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_tiny_engine(temp_dir.path());

    for i in 0..10 {
        engine.put(&package_key(i), b"Package: pkg\nVersion: 1.0\n").unwrap();
    }

    assert!(engine.sstable_count() >= 3, "got {} tables", engine.sstable_count());
    assert!(engine.memtable_size() < 100);
    for i in 0..10 {
        assert!(engine.get(&package_key(i)).unwrap().is_some(), "package {} lost", i);
    }
}

#[test]
fn test_compact_merges_everything() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.flush().unwrap();
    engine.put(b"a", b"2").unwrap();
    engine.put(b"b", b"1").unwrap();
    engine.flush().unwrap();
    engine.delete(b"b").unwrap();
    engine.put(b"c", b"3").unwrap();

    let stats = engine.compact().unwrap();

    assert_eq!((stats.tables_before, stats.tables_after), (3, 1));
    assert_eq!(stats.entries_written, 2);
    assert!(stats.bytes_after < stats.bytes_before);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.get(b"a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), None);
    assert_eq!(engine.get(b"c").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn test_compact_empty_engine() {
    let (_temp, engine) = setup_temp_engine();

    let stats = engine.compact().unwrap();

    assert_eq!(stats, Default::default());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_unflushed_writes_replayed_from_wal() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path());
        engine.put(b"Mdebian", b"mirror").unwrap();
        engine.put(b"Mubuntu", b"mirror").unwrap();
        engine.delete(b"Mdebian").unwrap();
        engine.put(b"Mdevuan", b"mirror").unwrap();
        drop(engine);
    }

    let engine = open_engine(temp_dir.path());

    // Replayed entries are flushed straight away and the WAL emptied
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(std::fs::metadata(temp_dir.path().join("wal.log")).unwrap().len(), 0);

    assert_eq!(engine.get(b"Mdebian").unwrap(), None);
    assert_eq!(engine.get(b"Mubuntu").unwrap(), Some(b"mirror".to_vec()));
    assert_eq!(engine.get(b"Mdevuan").unwrap(), Some(b"mirror".to_vec()));
}

#[test]
fn test_repeated_crashes_lose_nothing() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = open_engine(temp_dir.path());
        engine.put(b"key", b"value").unwrap();
    }
    for _ in 0..2 {
        let engine = open_engine(temp_dir.path());
        assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    // The WAL was folded into a table once, not on every open
    assert_eq!(open_engine(temp_dir.path()).sstable_count(), 1);
}

#[test]
fn test_close_leaves_empty_wal() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path());
    engine.put(b"key", b"value").unwrap();
    engine.close().unwrap();

    assert_eq!(std::fs::metadata(temp_dir.path().join("wal.log")).unwrap().len(), 0);
    let engine = open_engine(temp_dir.path());
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert_eq!(engine.sstable_count(), 1);
}

#[test]
fn test_repair_keeps_healthy_tables() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open_engine(temp_dir.path());
        engine.put(b"a", b"1").unwrap();
        engine.close().unwrap();
    }

    let report = Engine::repair(temp_dir.path()).unwrap();

    assert_eq!(report.tables_kept.len(), 1);
    assert!(report.tables_quarantined.is_empty());
    assert_eq!(open_engine(temp_dir.path()).get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_open_path_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();

    assert_eq!(engine.config().memtable_size_limit, 4 * 1024 * 1024);
    assert_eq!(engine.config().wal_sync_strategy, WalSyncStrategy::EveryWrite);
}

#[test]
fn test_stats_follow_writes() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config_for(temp_dir.path(), 1024)).unwrap();

    engine.put(b"abc", b"12345").unwrap();
    let stats = engine.stats();
    assert_eq!((stats.memtable_entries, stats.memtable_bytes), (1, 8));
    assert_eq!(stats.last_sequence, 1);

    engine.flush().unwrap();
    let stats = engine.stats();
    assert_eq!((stats.memtable_entries, stats.sstable_count), (0, 1));
    assert!(stats.sstable_bytes > 0);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_readers_run_alongside_writer() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    for i in 0..100 {
        engine.put(&package_key(i), b"v1").unwrap();
    }

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 100..200 {
                engine.put(&package_key(i), b"v1").unwrap();
            }
            engine.flush().unwrap();
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..100 {
                    assert_eq!(engine.get(&package_key(i)).unwrap(), Some(b"v1".to_vec()));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.stats().last_sequence, 200);
}

#[test]
fn test_concurrent_writers_with_flushes() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(open_tiny_engine(temp_dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("T{} {:02}", t, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        for i in 0..25 {
            let key = format!("T{} {:02}", t, i);
            assert_eq!(engine.get(key.as_bytes()).unwrap(), Some(key.into_bytes()));
        }
    }
    assert_eq!(engine.stats().last_sequence, 100);
}
