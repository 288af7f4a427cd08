//! SQLite-backed block storage. The parsed block is stored as one JSON
//! payload column keyed by hash.

use crate::journal::WriteKind;
use crate::{map_sqlite_err, sql_text, Shared};
use oxpool_store::{BlockStore, StoreError, StoredBlock};
use oxpool_types::BlockHash;
use std::rc::Rc;

pub struct SqliteBlockStore {
    shared: Rc<Shared>,
}

impl SqliteBlockStore {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    fn ensure_cursor_closed(&self, what: &str) -> Result<(), StoreError> {
        if self.shared.iterating.get() {
            return Err(StoreError::Backend(format!(
                "{what} is not available while an iteration cursor is open"
            )));
        }
        Ok(())
    }
}

impl BlockStore for SqliteBlockStore {
    fn load(&self, hash: &BlockHash) -> Result<StoredBlock, StoreError> {
        self.ensure_cursor_closed("load")?;
        let payload: String = self
            .shared
            .conn
            .query_row(
                "SELECT payload FROM blocks WHERE hash = ?1",
                [hash.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(hash.to_string()),
                other => map_sqlite_err(other),
            })?;
        serde_json::from_str(&payload)
            .map_err(|e| StoreError::Corruption(format!("block {hash}: {e}")))
    }

    fn save(&self, hash: &BlockHash, block: &StoredBlock) -> Result<(), StoreError> {
        let payload = serde_json::to_string(block)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Upsert in a single statement so a deferred save stays one journal
        // line and re-persisting a block is not a conflict.
        let sql = format!(
            "INSERT INTO blocks (hash, payload) VALUES ({}, {}) \
             ON CONFLICT(hash) DO UPDATE SET payload = excluded.payload",
            sql_text(hash.as_str()),
            sql_text(&payload),
        );
        self.shared.execute_or_journal(WriteKind::Insert, &sql)
    }

    fn remove(&self, hash: &BlockHash) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM blocks WHERE hash = {}", sql_text(hash.as_str()));
        self.shared.execute_or_journal(WriteKind::Update, &sql)
    }

    fn exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        self.ensure_cursor_closed("exists")?;
        let mut stmt = self
            .shared
            .conn
            .prepare("SELECT 1 FROM blocks WHERE hash = ?1")
            .map_err(map_sqlite_err)?;
        stmt.exists([hash.as_str()]).map_err(map_sqlite_err)
    }

    fn truncate(&self) -> Result<(), StoreError> {
        self.shared
            .execute_or_journal(WriteKind::Update, "DELETE FROM blocks")
    }
}
