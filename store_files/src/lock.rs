//! File-backed lock lease storage.

use crate::{create_dir, io_err};
use oxpool_store::{LockLease, LockStore, StoreError};
use std::path::{Path, PathBuf};

pub struct FileLockStore {
    dir: PathBuf,
}

impl FileLockStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        create_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn lease_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl LockStore for FileLockStore {
    fn read_lease(&self, name: &str) -> Result<Option<LockLease>, StoreError> {
        let path = self.lease_path(name);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err("read lease", e)),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| StoreError::Corruption(format!("{}: {e}", path.display())))
    }

    fn write_lease(&self, lease: &LockLease) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(lease)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(self.lease_path(&lease.name), data).map_err(|e| io_err("write lease", e))
    }

    fn clear_lease(&self, name: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.lease_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("clear lease", e)),
        }
    }
}
