//! Deferred-write journals.
//!
//! Each journal is a newline-delimited sequence of ready-to-run SQL
//! statements. Statements are appended while the connection's iteration
//! cursor is open and replayed in order once it closes; the files are
//! deleted after a successful replay.

use crate::is_duplicate_key;
use oxpool_store::StoreError;
use rusqlite::Connection;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which journal file a deferred statement belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Insert,
    Update,
}

const INSERTS_FILE: &str = "journal_inserts.sql";
const UPDATES_FILE: &str = "journal_updates.sql";

pub(crate) struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, kind: WriteKind) -> PathBuf {
        match kind {
            WriteKind::Insert => self.dir.join(INSERTS_FILE),
            WriteKind::Update => self.dir.join(UPDATES_FILE),
        }
    }

    pub(crate) fn append(&self, kind: WriteKind, sql: &str) -> Result<(), StoreError> {
        debug_assert!(!sql.contains('\n'), "journaled statements must be one line");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(kind))
            .map_err(|e| StoreError::Backend(format!("open journal: {e}")))?;
        writeln!(file, "{sql}").map_err(|e| StoreError::Backend(format!("append journal: {e}")))?;
        Ok(())
    }

    /// Replay both journals in order — inserts before updates — and delete
    /// them. A duplicate-key failure on an insert is success: the record
    /// already exists from a prior run.
    pub(crate) fn replay(&self, conn: &Connection) -> Result<(), StoreError> {
        self.replay_file(conn, WriteKind::Insert)?;
        self.replay_file(conn, WriteKind::Update)?;
        Ok(())
    }

    fn replay_file(&self, conn: &Connection, kind: WriteKind) -> Result<(), StoreError> {
        let path = self.path(kind);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::Backend(format!("read journal: {e}"))),
        };

        let mut applied = 0u64;
        for statement in data.lines().filter(|l| !l.trim().is_empty()) {
            match conn.execute(statement, []) {
                Ok(_) => applied += 1,
                Err(e) if kind == WriteKind::Insert && is_duplicate_key(&e) => {
                    tracing::debug!(statement, "journaled insert already applied");
                }
                Err(e) => {
                    return Err(StoreError::Backend(format!(
                        "replay journaled statement: {e}"
                    )))
                }
            }
        }

        std::fs::remove_file(&path)
            .map_err(|e| StoreError::Backend(format!("remove journal: {e}")))?;
        tracing::debug!(?kind, applied, "replayed write journal");
        Ok(())
    }
}
