//! Storage facade
//!
//! `KvStore` is the handle callers hold: it owns the lifecycle of one
//! engine directory (open, close, compact, drop), creates batches and
//! transactions, and can spawn independent temporary stores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;

use crate::batch::WriteBatch;
use crate::config::Config;
use crate::engine::{Engine, EngineStats};
use crate::error::{KvError, Result};
use crate::storage::RepairReport;
use crate::traits::{PrefixReader, Reader, Storage, Writer};
use crate::transaction::KvTransaction;

const TEMP_PREFIX: &str = "aptkv-temp-";

/// Handle to one storage directory
///
/// The handle starts closed (`new`) or open (`open_path`, `open_with`) and
/// may be closed and reopened any number of times. Every data operation on
/// a closed handle fails with `KvError::NotOpen`.
pub struct KvStore {
    config: Config,
    // Declared before `temp_dir`: the engine must let go of its files
    // before a temporary directory is removed
    engine: RwLock<Option<Arc<Engine>>>,
    /// Set for stores made by `create_temporary`
    temp_dir: Mutex<Option<TempDir>>,
    temporary: bool,
}

impl KvStore {
    /// Closed handle for the configured directory
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: RwLock::new(None),
            temp_dir: Mutex::new(None),
            temporary: false,
        }
    }

    /// Create and open a handle with the given config
    pub fn open_with(config: Config) -> Result<Self> {
        let store = Self::new(config);
        store.open()?;
        Ok(store)
    }

    /// Create and open a handle with default settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(Config {
            data_dir: path.as_ref().to_path_buf(),
            ..Config::default()
        })
    }

    /// Offline repair of a directory no handle has open
    ///
    /// Damaged tables are moved aside and the manifest is rebuilt from the
    /// rest. A damaged WAL tail is handled by the next regular open.
    pub fn recover(path: impl AsRef<Path>) -> Result<RepairReport> {
        Engine::repair(path.as_ref())
    }

    pub fn is_open(&self) -> bool {
        self.engine.read().is_some()
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Directory this handle stores its data in
    pub fn path(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.with_engine(|engine| Ok(engine.stats()))
    }

    /// Run `f` against the open engine
    fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> Result<T>) -> Result<T> {
        let guard = self.engine.read_recursive();
        match guard.as_ref() {
            Some(engine) => f(engine.as_ref()),
            None => Err(KvError::NotOpen),
        }
    }

    fn shared_engine(&self) -> Result<Arc<Engine>> {
        self.engine.read_recursive().clone().ok_or(KvError::NotOpen)
    }

    fn temp_base(&self) -> PathBuf {
        self.config
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Delete the directory of a closed, persistent handle
    fn remove_data_dir(&self) -> Result<()> {
        let dir = &self.config.data_dir;
        if !dir.exists() {
            return Ok(());
        }
        // Refuse to delete a directory another handle has open
        let _lock = Engine::lock_dir(dir)?;
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Reader for KvStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_engine(|engine| engine.get(key)?.ok_or(KvError::NotFound))
    }
}

impl Writer for KvStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_engine(|engine| engine.put(key, value))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_engine(|engine| engine.delete(key))
    }
}

impl PrefixReader for KvStore {
    fn has_prefix(&self, prefix: &[u8]) -> Result<bool> {
        self.with_engine(|engine| engine.read_view().has_prefix(prefix))
    }

    fn process_by_prefix(
        &self,
        prefix: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        // The handle lock is released before the callback runs
        let view = self.with_engine(|engine| Ok(engine.read_view()))?;
        for item in view.scan_prefix(prefix) {
            let (key, value) = item?;
            f(&key, &value)?;
        }
        Ok(())
    }

    fn keys_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let view = self.with_engine(|engine| Ok(engine.read_view()))?;
        view.scan_prefix(prefix)
            .map(|item| item.map(|(key, _)| key))
            .collect()
    }

    fn fetch_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let view = self.with_engine(|engine| Ok(engine.read_view()))?;
        view.scan_prefix(prefix)
            .map(|item| item.map(|(_, value)| value))
            .collect()
    }
}

impl Storage for KvStore {
    type Batch = WriteBatch;
    type Transaction = KvTransaction;

    fn create_batch(&self) -> Result<WriteBatch> {
        Ok(WriteBatch::new(self.shared_engine()?))
    }

    fn open_transaction(&self) -> Result<KvTransaction> {
        Ok(KvTransaction::begin(self.shared_engine()?))
    }

    fn create_temporary(&self) -> Result<Self> {
        if !self.is_open() {
            return Err(KvError::NotOpen);
        }

        let base = self.temp_base();
        fs::create_dir_all(&base)?;
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&base)?;

        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..self.config.clone()
        };
        let store = Self {
            config,
            engine: RwLock::new(None),
            temp_dir: Mutex::new(Some(dir)),
            temporary: true,
        };
        store.open()?;

        tracing::debug!(dir = %store.path().display(), "created temporary storage");
        Ok(store)
    }

    fn open(&self) -> Result<()> {
        let mut guard = self.engine.write();
        if guard.is_some() {
            return Ok(());
        }
        if self.temporary && self.temp_dir.lock().is_none() {
            return Err(KvError::Storage(
                "temporary storage has been dropped".to_string(),
            ));
        }
        *guard = Some(Arc::new(Engine::open(self.config.clone())?));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.engine.write();
        let Some(engine) = guard.take() else {
            return Ok(());
        };
        match Arc::try_unwrap(engine) {
            Ok(engine) => engine.close(),
            Err(shared) => {
                let holders = Arc::strong_count(&shared) - 1;
                *guard = Some(shared);
                Err(KvError::InUse(format!(
                    "{} batch(es) or transaction(s) still hold the storage",
                    holders
                )))
            }
        }
    }

    fn compact_db(&self) -> Result<()> {
        self.with_engine(|engine| engine.compact().map(|_| ()))
    }

    fn drop_db(&self) -> Result<()> {
        self.close()?;

        let temp_dir = self.temp_dir.lock().take();
        match temp_dir {
            Some(dir) => dir.close()?,
            None if self.temporary => {}
            None => self.remove_data_dir()?,
        }

        tracing::info!(dir = %self.config.data_dir.display(), "storage dropped");
        Ok(())
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("data_dir", &self.config.data_dir)
            .field("open", &self.is_open())
            .field("temporary", &self.temporary)
            .finish()
    }
}
