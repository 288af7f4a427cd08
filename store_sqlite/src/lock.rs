//! SQLite-backed lock lease storage.
//!
//! Leases are only touched outside iteration (locks are obtained before a
//! cursor opens and released after it closes), so these operations run
//! directly on the connection.

use crate::{map_sqlite_err, Shared};
use oxpool_store::{LockLease, LockStore, StoreError};
use std::rc::Rc;

pub struct SqliteLockStore {
    shared: Rc<Shared>,
}

impl SqliteLockStore {
    pub(crate) fn new(shared: Rc<Shared>) -> Self {
        Self { shared }
    }
}

impl LockStore for SqliteLockStore {
    fn read_lease(&self, name: &str) -> Result<Option<LockLease>, StoreError> {
        let result = self.shared.conn.query_row(
            "SELECT name, holder, acquired_at, ttl_secs FROM leases WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        );
        match result {
            Ok((name, holder, acquired_at, ttl_secs)) => Ok(Some(LockLease {
                name,
                holder,
                acquired_at: acquired_at
                    .parse()
                    .map_err(|e| StoreError::Corruption(format!("lease row: {e}")))?,
                ttl_secs,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sqlite_err(e)),
        }
    }

    fn write_lease(&self, lease: &LockLease) -> Result<(), StoreError> {
        self.shared
            .conn
            .execute(
                "INSERT INTO leases (name, holder, acquired_at, ttl_secs) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, \
                 acquired_at = excluded.acquired_at, ttl_secs = excluded.ttl_secs",
                rusqlite::params![
                    lease.name,
                    lease.holder,
                    lease.acquired_at.to_string(),
                    lease.ttl_secs
                ],
            )
            .map(|_| ())
            .map_err(map_sqlite_err)
    }

    fn clear_lease(&self, name: &str) -> Result<(), StoreError> {
        self.shared
            .conn
            .execute("DELETE FROM leases WHERE name = ?1", [name])
            .map(|_| ())
            .map_err(map_sqlite_err)
    }
}
