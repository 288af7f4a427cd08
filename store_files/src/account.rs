//! File-backed account storage.

use crate::{create_dir, io_err};
use oxpool_store::{AccountFilter, AccountRecord, AccountStore, StoreError};
use oxpool_types::MinerAddress;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

pub struct FileAccountStore {
    dir: PathBuf,
}

impl FileAccountStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        create_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn record_path(&self, address: &MinerAddress) -> PathBuf {
        self.dir.join(format!("{}.json", address.storage_key()))
    }

    fn read_record(&self, path: &Path) -> Result<AccountRecord, StoreError> {
        let data = std::fs::read_to_string(path).map_err(|e| io_err("read account", e))?;
        serde_json::from_str(&data)
            .map_err(|e| StoreError::Corruption(format!("{}: {e}", path.display())))
    }

    fn write_record(&self, path: &Path, record: &AccountRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| io_err("write account", e))
    }
}

impl AccountStore for FileAccountStore {
    fn load(&self, address: &MinerAddress) -> Result<AccountRecord, StoreError> {
        let path = self.record_path(address);
        if !path.exists() {
            return Err(StoreError::NotFound(address.to_string()));
        }
        self.read_record(&path)
    }

    fn insert(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.address);
        if path.exists() {
            return Err(StoreError::Duplicate(record.address.to_string()));
        }
        self.write_record(&path, record)
    }

    fn update(&self, record: &AccountRecord) -> Result<(), StoreError> {
        self.write_record(&self.record_path(&record.address), record)
    }

    fn exists(&self, address: &MinerAddress) -> Result<bool, StoreError> {
        Ok(self.record_path(address).exists())
    }

    fn for_each(
        &self,
        filter: AccountFilter,
        visit: &mut dyn FnMut(AccountRecord) -> Result<ControlFlow<()>, StoreError>,
    ) -> Result<(), StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err("scan accounts", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("scan accounts", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = self.read_record(&path)?;
            if !record.matches(filter) {
                continue;
            }
            if let ControlFlow::Break(()) = visit(record)? {
                break;
            }
        }
        Ok(())
    }

    fn truncate(&self) -> Result<(), StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err("scan accounts", e))?;
        let mut removed = 0u64;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("scan accounts", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| io_err("remove account", e))?;
                removed += 1;
            }
        }
        tracing::debug!(removed, "truncated account store");
        Ok(())
    }
}
