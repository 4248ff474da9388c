//! Table manifest
//!
//! The manifest is the single source of truth for which SSTables are live.
//! It is replaced atomically (write temp file, fsync, rename), so a crash in
//! the middle of a flush or compaction leaves either the old or the new set.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TMP: &str = "MANIFEST.tmp";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Id the next flushed or compacted table receives
    pub next_sstable_id: u64,
    /// Live table ids, newest first
    pub sstables: Vec<u64>,
}

impl Manifest {
    /// Load the manifest, `None` if the directory has never had one
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    pub fn store(&self, dir: &Path) -> Result<()> {
        let tmp_path = dir.join(MANIFEST_TMP);
        let data = serde_json::to_vec_pretty(self)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, dir.join(MANIFEST_FILE))?;
        sync_dir(dir);
        Ok(())
    }
}

/// Persist the rename itself; not every platform can open a directory
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        if let Err(e) = handle.sync_all() {
            tracing::debug!(dir = %dir.display(), error = %e, "directory fsync unavailable");
        }
    }
}
