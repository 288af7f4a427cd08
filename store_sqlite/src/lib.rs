//! Relational storage backend on a single SQLite connection.
//!
//! The connection is cursor-exclusive: while an iteration cursor is open no
//! other statement may run on it. Writes attempted mid-iteration are
//! rendered as ready-to-run SQL and appended to one of two newline-delimited
//! journal files — `journal_inserts.sql` for INSERT statements,
//! `journal_updates.sql` for UPDATE/DELETE statements. Both are replayed in
//! order (inserts first) as soon as the cursor is exhausted, then deleted.
//! A duplicate-key failure on a replayed insert is treated as success: the
//! record already exists from a prior run. Journals left behind by a
//! crashed invocation are replayed when the backend is opened.

mod account;
mod block;
mod journal;
mod lock;

pub use account::SqliteAccountStore;
pub use block::SqliteBlockStore;
pub use lock::SqliteLockStore;

use journal::Journal;
use oxpool_store::{PoolStore, StoreError};
use rusqlite::Connection;
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    address                 TEXT PRIMARY KEY,
    hash                    TEXT,
    payouts_sum             TEXT NOT NULL,
    fee_percent_guessed     REAL,
    first_inspected_at      TEXT,
    last_inspected_at       TEXT,
    inspected_times         INTEGER NOT NULL,
    found_at                TEXT,
    exported_at             TEXT,
    invalidated_at          TEXT,
    invalidated_exported_at TEXT
);
CREATE TABLE IF NOT EXISTS blocks (
    hash    TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS leases (
    name        TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    acquired_at TEXT NOT NULL,
    ttl_secs    INTEGER NOT NULL
);
";

/// Shared connection state for the three entity stores.
pub(crate) struct Shared {
    pub(crate) conn: Connection,
    /// True while an iteration cursor is open on the connection.
    pub(crate) iterating: Cell<bool>,
    pub(crate) journal: Journal,
}

impl Shared {
    /// Run a write statement, or journal it when the cursor is open.
    ///
    /// `kind` decides which journal file receives a deferred statement.
    pub(crate) fn execute_or_journal(
        &self,
        kind: journal::WriteKind,
        sql: &str,
    ) -> Result<(), StoreError> {
        if self.iterating.get() {
            return self.journal.append(kind, sql);
        }
        self.conn
            .execute(sql, [])
            .map(|_| ())
            .map_err(map_sqlite_err)
    }

    pub(crate) fn replay_journals(&self) -> Result<(), StoreError> {
        self.journal.replay(&self.conn)
    }
}

/// Guard marking the connection's single cursor as open; resets on drop.
pub(crate) struct CursorGuard<'a> {
    shared: &'a Shared,
}

impl<'a> CursorGuard<'a> {
    pub(crate) fn open(shared: &'a Shared) -> Result<Self, StoreError> {
        if shared.iterating.get() {
            return Err(StoreError::Backend(
                "iteration cursor is already open on this connection".to_string(),
            ));
        }
        shared.iterating.set(true);
        Ok(Self { shared })
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.shared.iterating.set(false);
    }
}

/// The SQLite backend: one connection, three entity stores.
pub struct SqliteStore {
    accounts: SqliteAccountStore,
    blocks: SqliteBlockStore,
    locks: SqliteLockStore,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `path`. Journal files
    /// live next to the database file; leftovers from a crashed invocation
    /// are replayed before the store is handed out.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_err)?;

        let journal_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let shared = Rc::new(Shared {
            conn,
            iterating: Cell::new(false),
            journal: Journal::new(journal_dir),
        });
        shared.replay_journals()?;

        Ok(Self {
            accounts: SqliteAccountStore::new(Rc::clone(&shared)),
            blocks: SqliteBlockStore::new(Rc::clone(&shared)),
            locks: SqliteLockStore::new(shared),
        })
    }
}

impl PoolStore for SqliteStore {
    type Accounts = SqliteAccountStore;
    type Blocks = SqliteBlockStore;
    type Locks = SqliteLockStore;

    fn accounts(&self) -> &SqliteAccountStore {
        &self.accounts
    }

    fn blocks(&self) -> &SqliteBlockStore {
        &self.blocks
    }

    fn locks(&self) -> &SqliteLockStore {
        &self.locks
    }
}

pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("no rows".to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

pub(crate) fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Render a string as a SQL text literal.
pub(crate) fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render an optional string as a SQL text literal or NULL.
pub(crate) fn sql_text_opt(value: Option<String>) -> String {
    match value {
        Some(v) => sql_text(&v),
        None => "NULL".to_string(),
    }
}
