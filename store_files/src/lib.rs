//! Flat-file storage backend.
//!
//! One pretty-printed JSON file per record: accounts under
//! `accounts/<address with / normalized to _>.json`, blocks under
//! `blocks/<64-hex-hash>.json`, lock leases under `locks/<name>.json`.
//!
//! The backend provides no transactional isolation of its own; the
//! engine's exclusive lock is the only mutual-exclusion mechanism over it.

mod account;
mod block;
mod lock;

pub use account::FileAccountStore;
pub use block::FileBlockStore;
pub use lock::FileLockStore;

use oxpool_store::{PoolStore, StoreError};
use std::path::Path;

/// The file backend: a data directory holding the three record kinds.
pub struct FileStore {
    accounts: FileAccountStore,
    blocks: FileBlockStore,
    locks: FileLockStore,
}

impl FileStore {
    /// Open (creating if necessary) the backend rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let accounts = FileAccountStore::open(&dir.join("accounts"))?;
        let blocks = FileBlockStore::open(&dir.join("blocks"))?;
        let locks = FileLockStore::open(&dir.join("locks"))?;
        Ok(Self {
            accounts,
            blocks,
            locks,
        })
    }
}

impl PoolStore for FileStore {
    type Accounts = FileAccountStore;
    type Blocks = FileBlockStore;
    type Locks = FileLockStore;

    fn accounts(&self) -> &FileAccountStore {
        &self.accounts
    }

    fn blocks(&self) -> &FileBlockStore {
        &self.blocks
    }

    fn locks(&self) -> &FileLockStore {
        &self.locks
    }
}

pub(crate) fn io_err(context: &str, err: std::io::Error) -> StoreError {
    StoreError::Backend(format!("{context}: {err}"))
}

pub(crate) fn create_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err("create storage directory", e))
}
