//! SQLite-backed account storage.

use crate::journal::WriteKind;
use crate::{map_sqlite_err, sql_text, sql_text_opt, CursorGuard, Shared};
use oxpool_store::{
    AccountFilter, AccountRecord, AccountStore, StoreError, REQUIRED_INSPECTIONS,
};
use oxpool_types::MinerAddress;
use rusqlite::Row;
use std::ops::ControlFlow;
use std::rc::Rc;

const COLUMNS: &str = "address, hash, payouts_sum, fee_percent_guessed, first_inspected_at, \
                       last_inspected_at, inspected_times, found_at, exported_at, \
                       invalidated_at, invalidated_exported_at";

pub struct SqliteAccountStore {
    shared: Rc<Shared>,
}

impl SqliteAccountStore {
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

fn filter_where(filter: AccountFilter) -> String {
    let n = REQUIRED_INSPECTIONS;
    match filter {
        AccountFilter::All => "1 = 1".to_string(),
        AccountFilter::PendingInspection => format!(
            "invalidated_at IS NULL AND (inspected_times < {n} OR hash IS NULL)"
        ),
        AccountFilter::PendingExport => format!(
            "exported_at IS NULL AND inspected_times >= {n} AND hash IS NOT NULL \
             AND invalidated_at IS NULL"
        ),
        AccountFilter::PendingRetraction => {
            "hash IS NOT NULL AND invalidated_at IS NOT NULL \
             AND invalidated_exported_at IS NULL"
                .to_string()
        }
        AccountFilter::Exported => {
            "exported_at IS NOT NULL AND invalidated_at IS NULL".to_string()
        }
        AccountFilter::RetractionSent => {
            "invalidated_at IS NOT NULL AND invalidated_exported_at IS NOT NULL".to_string()
        }
        AccountFilter::HasHash => "hash IS NOT NULL".to_string(),
        AccountFilter::Invalidated => "invalidated_at IS NOT NULL".to_string(),
    }
}

fn insert_sql(record: &AccountRecord) -> String {
    format!(
        "INSERT INTO accounts ({COLUMNS}) VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        sql_text(&record.address.storage_key()),
        sql_text_opt(record.hash.as_ref().map(|h| h.to_string())),
        sql_text(&record.payouts_sum.to_string()),
        record
            .fee_percent_guessed
            .map_or("NULL".to_string(), |v| v.to_string()),
        sql_text_opt(record.first_inspected_at.map(|t| t.to_string())),
        sql_text_opt(record.last_inspected_at.map(|t| t.to_string())),
        record.inspected_times,
        sql_text_opt(record.found_at.map(|t| t.to_string())),
        sql_text_opt(record.exported_at.map(|t| t.to_string())),
        sql_text_opt(record.invalidated_at.map(|t| t.to_string())),
        sql_text_opt(record.invalidated_exported_at.map(|t| t.to_string())),
    )
}

fn update_sql(record: &AccountRecord) -> String {
    format!(
        "UPDATE accounts SET hash = {}, payouts_sum = {}, fee_percent_guessed = {}, \
         first_inspected_at = {}, last_inspected_at = {}, inspected_times = {}, \
         found_at = {}, exported_at = {}, invalidated_at = {}, \
         invalidated_exported_at = {} WHERE address = {}",
        sql_text_opt(record.hash.as_ref().map(|h| h.to_string())),
        sql_text(&record.payouts_sum.to_string()),
        record
            .fee_percent_guessed
            .map_or("NULL".to_string(), |v| v.to_string()),
        sql_text_opt(record.first_inspected_at.map(|t| t.to_string())),
        sql_text_opt(record.last_inspected_at.map(|t| t.to_string())),
        record.inspected_times,
        sql_text_opt(record.found_at.map(|t| t.to_string())),
        sql_text_opt(record.exported_at.map(|t| t.to_string())),
        sql_text_opt(record.invalidated_at.map(|t| t.to_string())),
        sql_text_opt(record.invalidated_exported_at.map(|t| t.to_string())),
        sql_text(&record.address.storage_key()),
    )
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corruption(format!("accounts row: {e}"))
}

fn row_to_record(row: &Row<'_>) -> Result<AccountRecord, StoreError> {
    let key: String = row.get(0).map_err(map_sqlite_err)?;
    let address: MinerAddress = key.replace('_', "/").parse().map_err(corrupt)?;

    let opt_hash: Option<String> = row.get(1).map_err(map_sqlite_err)?;
    let payouts_sum: String = row.get(2).map_err(map_sqlite_err)?;
    let opt_ts = |idx: usize| -> Result<Option<String>, StoreError> {
        row.get(idx).map_err(map_sqlite_err)
    };

    let parse_ts = |value: Option<String>| -> Result<Option<oxpool_types::Timestamp>, StoreError> {
        value.map(|v| v.parse().map_err(corrupt)).transpose()
    };

    Ok(AccountRecord {
        address,
        hash: opt_hash.map(|h| h.parse().map_err(corrupt)).transpose()?,
        payouts_sum: payouts_sum.parse().map_err(corrupt)?,
        fee_percent_guessed: row.get(3).map_err(map_sqlite_err)?,
        first_inspected_at: parse_ts(opt_ts(4)?)?,
        last_inspected_at: parse_ts(opt_ts(5)?)?,
        inspected_times: row.get(6).map_err(map_sqlite_err)?,
        found_at: parse_ts(opt_ts(7)?)?,
        exported_at: parse_ts(opt_ts(8)?)?,
        invalidated_at: parse_ts(opt_ts(9)?)?,
        invalidated_exported_at: parse_ts(opt_ts(10)?)?,
    })
}

impl AccountStore for SqliteAccountStore {
    fn load(&self, address: &MinerAddress) -> Result<AccountRecord, StoreError> {
        self.ensure_cursor_closed("load")?;
        let sql = format!("SELECT {COLUMNS} FROM accounts WHERE address = ?1");
        let mut stmt = self.shared.conn.prepare(&sql).map_err(map_sqlite_err)?;
        stmt.query_row([address.storage_key()], |row| Ok(row_to_record(row)))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(address.to_string())
                }
                other => map_sqlite_err(other),
            })?
    }

    fn insert(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let sql = insert_sql(record);
        if self.shared.iterating.get() {
            return self.shared.journal.append(WriteKind::Insert, &sql);
        }
        match self.shared.conn.execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(e) if crate::is_duplicate_key(&e) => {
                Err(StoreError::Duplicate(record.address.to_string()))
            }
            Err(e) => Err(map_sqlite_err(e)),
        }
    }

    fn update(&self, record: &AccountRecord) -> Result<(), StoreError> {
        self.shared
            .execute_or_journal(WriteKind::Update, &update_sql(record))
    }

    fn exists(&self, address: &MinerAddress) -> Result<bool, StoreError> {
        self.ensure_cursor_closed("exists")?;
        let mut stmt = self
            .shared
            .conn
            .prepare("SELECT 1 FROM accounts WHERE address = ?1")
            .map_err(map_sqlite_err)?;
        stmt.exists([address.storage_key()]).map_err(map_sqlite_err)
    }

    fn for_each(
        &self,
        filter: AccountFilter,
        visit: &mut dyn FnMut(AccountRecord) -> Result<ControlFlow<()>, StoreError>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM accounts WHERE {} ORDER BY address",
            filter_where(filter)
        );
        {
            let _cursor = CursorGuard::open(&self.shared)?;
            let mut stmt = self.shared.conn.prepare(&sql).map_err(map_sqlite_err)?;
            let mut rows = stmt.query([]).map_err(map_sqlite_err)?;
            while let Some(row) = rows.next().map_err(map_sqlite_err)? {
                let record = row_to_record(row)?;
                if let ControlFlow::Break(()) = visit(record)? {
                    break;
                }
            }
        }
        // Cursor is closed; apply whatever the visitor deferred.
        self.shared.replay_journals()
    }

    fn count(&self, filter: AccountFilter) -> Result<u64, StoreError> {
        self.ensure_cursor_closed("count")?;
        let sql = format!(
            "SELECT COUNT(*) FROM accounts WHERE {}",
            filter_where(filter)
        );
        self.shared
            .conn
            .query_row(&sql, [], |row| row.get::<_, u64>(0))
            .map_err(map_sqlite_err)
    }

    fn truncate(&self) -> Result<(), StoreError> {
        self.shared
            .execute_or_journal(WriteKind::Update, "DELETE FROM accounts")
    }
}
