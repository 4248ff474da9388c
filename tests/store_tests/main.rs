use aptkv::{Config, KvStore, WalSyncStrategy};
use tempfile::TempDir;

mod batch_tests;

fn store_config(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .build()
}

fn setup_temp_store() -> (TempDir, KvStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = KvStore::open_with(store_config(&temp_dir.path().join("db"))).unwrap();
    (temp_dir, store)
}
