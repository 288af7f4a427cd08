//! File-backed block storage.

use crate::{create_dir, io_err};
use oxpool_store::{BlockStore, StoreError, StoredBlock};
use oxpool_types::BlockHash;
use std::path::{Path, PathBuf};

pub struct FileBlockStore {
    dir: PathBuf,
}

impl FileBlockStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        create_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn block_path(&self, hash: &BlockHash) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }
}

impl BlockStore for FileBlockStore {
    fn load(&self, hash: &BlockHash) -> Result<StoredBlock, StoreError> {
        let path = self.block_path(hash);
        if !path.exists() {
            return Err(StoreError::NotFound(hash.to_string()));
        }
        let data = std::fs::read_to_string(&path).map_err(|e| io_err("read block", e))?;
        serde_json::from_str(&data)
            .map_err(|e| StoreError::Corruption(format!("{}: {e}", path.display())))
    }

    fn save(&self, hash: &BlockHash, block: &StoredBlock) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(block)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.block_path(hash), data).map_err(|e| io_err("write block", e))
    }

    fn remove(&self, hash: &BlockHash) -> Result<(), StoreError> {
        match std::fs::remove_file(self.block_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove block", e)),
        }
    }

    fn exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.block_path(hash).exists())
    }

    fn truncate(&self) -> Result<(), StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err("scan blocks", e))?;
        let mut removed = 0u64;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("scan blocks", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| io_err("remove block", e))?;
                removed += 1;
            }
        }
        tracing::debug!(removed, "truncated block store");
        Ok(())
    }
}
