//! Account records and the account storage trait.

use crate::StoreError;
use oxpool_types::{Amount, BlockHash, MinerAddress, Timestamp};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// How many inspections a found block must survive before it is considered
/// confirmed and eligible for export.
pub const REQUIRED_INSPECTIONS: u32 = 3;

/// Durable state of one tracked miner address.
///
/// The lifecycle phase is never stored; it is derived from the field
/// combination via [`AccountRecord::phase`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub address: MinerAddress,
    /// Hash of this address's found block, once one has been seen.
    pub hash: Option<BlockHash>,
    /// Cumulative amount distributed to miners in the found block.
    pub payouts_sum: Amount,
    /// Derived pool-fee estimate; not authoritative, may be inconclusive.
    pub fee_percent_guessed: Option<f64>,
    pub first_inspected_at: Option<Timestamp>,
    pub last_inspected_at: Option<Timestamp>,
    pub inspected_times: u32,
    /// Time reported by the found block itself; the export ordering key.
    pub found_at: Option<Timestamp>,
    /// Set once the found block has been emitted downstream.
    pub exported_at: Option<Timestamp>,
    pub invalidated_at: Option<Timestamp>,
    /// Set once the retraction notice for an invalidated block has been
    /// emitted downstream.
    pub invalidated_exported_at: Option<Timestamp>,
}

impl AccountRecord {
    /// A freshly gathered record: all lifecycle fields empty.
    pub fn new(address: MinerAddress) -> Self {
        Self {
            address,
            hash: None,
            payouts_sum: Amount::ZERO,
            fee_percent_guessed: None,
            first_inspected_at: None,
            last_inspected_at: None,
            inspected_times: 0,
            found_at: None,
            exported_at: None,
            invalidated_at: None,
            invalidated_exported_at: None,
        }
    }

    /// Eligible for the inspect pass.
    pub fn is_pending_inspection(&self) -> bool {
        self.invalidated_at.is_none()
            && (self.inspected_times < REQUIRED_INSPECTIONS || self.hash.is_none())
    }

    /// Confirmed and not yet exported.
    pub fn is_pending_export(&self) -> bool {
        self.exported_at.is_none()
            && self.inspected_times >= REQUIRED_INSPECTIONS
            && self.hash.is_some()
            && self.invalidated_at.is_none()
    }

    /// Invalidated with a retraction still owed downstream.
    pub fn is_pending_retraction(&self) -> bool {
        self.hash.is_some()
            && self.invalidated_at.is_some()
            && self.invalidated_exported_at.is_none()
    }

    /// Derive the conceptual lifecycle phase from the stored fields.
    pub fn phase(&self) -> AccountPhase {
        if self.invalidated_at.is_some() {
            if self.invalidated_exported_at.is_some() {
                AccountPhase::InvalidatedExported
            } else {
                AccountPhase::Invalidated
            }
        } else if self.exported_at.is_some() {
            AccountPhase::Exported
        } else if self.hash.is_some() && self.inspected_times >= REQUIRED_INSPECTIONS {
            AccountPhase::Confirmed
        } else if self.hash.is_none() && self.inspected_times == 0 {
            AccountPhase::New
        } else {
            AccountPhase::PendingInspection
        }
    }

    /// Whether this record matches a storage filter.
    pub fn matches(&self, filter: AccountFilter) -> bool {
        match filter {
            AccountFilter::All => true,
            AccountFilter::PendingInspection => self.is_pending_inspection(),
            AccountFilter::PendingExport => self.is_pending_export(),
            AccountFilter::PendingRetraction => self.is_pending_retraction(),
            AccountFilter::Exported => {
                self.exported_at.is_some() && self.invalidated_at.is_none()
            }
            AccountFilter::RetractionSent => {
                self.invalidated_at.is_some() && self.invalidated_exported_at.is_some()
            }
            AccountFilter::HasHash => self.hash.is_some(),
            AccountFilter::Invalidated => self.invalidated_at.is_some(),
        }
    }
}

/// Conceptual lifecycle states, derived from the field combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountPhase {
    New,
    PendingInspection,
    Confirmed,
    Exported,
    Invalidated,
    InvalidatedExported,
}

/// The recurring record predicates, pushed down to the backend so the
/// relational store can express them as WHERE clauses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountFilter {
    All,
    PendingInspection,
    PendingExport,
    PendingRetraction,
    Exported,
    RetractionSent,
    HasHash,
    Invalidated,
}

/// Trait for account storage operations.
///
/// `for_each` is the only iteration primitive: it threads an explicit cursor
/// through the backend and hands each matching record to the visitor, which
/// may stop early. Backends with cursor-exclusivity constraints are expected
/// to defer writes issued from inside the visitor and apply them after the
/// cursor closes.
pub trait AccountStore {
    fn load(&self, address: &MinerAddress) -> Result<AccountRecord, StoreError>;

    /// Create a record. Fails with [`StoreError::Duplicate`] when the address
    /// is already tracked.
    fn insert(&self, record: &AccountRecord) -> Result<(), StoreError>;

    /// Overwrite an existing record.
    fn update(&self, record: &AccountRecord) -> Result<(), StoreError>;

    fn exists(&self, address: &MinerAddress) -> Result<bool, StoreError>;

    fn for_each(
        &self,
        filter: AccountFilter,
        visit: &mut dyn FnMut(AccountRecord) -> Result<ControlFlow<()>, StoreError>,
    ) -> Result<(), StoreError>;

    /// Count records matching the filter without materializing them.
    fn count(&self, filter: AccountFilter) -> Result<u64, StoreError> {
        let mut n = 0u64;
        self.for_each(filter, &mut |_| {
            n += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(n)
    }

    /// Delete every tracked record.
    fn truncate(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> MinerAddress {
        "gKNRtSL1pUaTpzMuPMznKw49ILtP6qX3".parse().unwrap()
    }

    fn hash() -> BlockHash {
        "74c7e08b2e8f0700d47ef880779ecfeeae1f937a5f304e0a22ffd0d5e4406e56"
            .parse()
            .unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn new_record_is_new_and_pending_inspection() {
        let record = AccountRecord::new(addr());
        assert_eq!(record.phase(), AccountPhase::New);
        assert!(record.is_pending_inspection());
        assert!(!record.is_pending_export());
    }

    #[test]
    fn confirmed_requires_hash_and_three_inspections() {
        let mut record = AccountRecord::new(addr());
        record.hash = Some(hash());
        record.inspected_times = 2;
        assert_eq!(record.phase(), AccountPhase::PendingInspection);

        record.inspected_times = REQUIRED_INSPECTIONS;
        assert_eq!(record.phase(), AccountPhase::Confirmed);
        assert!(record.is_pending_export());
        assert!(!record.is_pending_inspection());
    }

    #[test]
    fn invalidation_dominates_other_phases() {
        let mut record = AccountRecord::new(addr());
        record.hash = Some(hash());
        record.inspected_times = 5;
        record.exported_at = Some(ts("2024-01-01 00:00:00"));
        record.invalidated_at = Some(ts("2024-01-02 00:00:00"));
        assert_eq!(record.phase(), AccountPhase::Invalidated);
        assert!(record.is_pending_retraction());

        record.invalidated_exported_at = Some(ts("2024-01-02 00:01:00"));
        assert_eq!(record.phase(), AccountPhase::InvalidatedExported);
        assert!(!record.is_pending_retraction());
    }

    #[test]
    fn filters_agree_with_predicates() {
        let mut record = AccountRecord::new(addr());
        assert!(record.matches(AccountFilter::All));
        assert!(record.matches(AccountFilter::PendingInspection));
        assert!(!record.matches(AccountFilter::HasHash));

        record.hash = Some(hash());
        record.inspected_times = 3;
        assert!(record.matches(AccountFilter::PendingExport));
        assert!(record.matches(AccountFilter::HasHash));

        record.exported_at = Some(ts("2024-01-01 00:00:00"));
        assert!(record.matches(AccountFilter::Exported));
        assert!(!record.matches(AccountFilter::PendingExport));
    }
}
