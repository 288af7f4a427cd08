//! Lock lease records and the lock storage trait.

use crate::StoreError;
use oxpool_types::Timestamp;
use serde::{Deserialize, Serialize};

/// A named, TTL-bounded mutual-exclusion lease, durable in the backend so it
/// is visible to every process invocation.
///
/// A lease whose age exceeds its TTL is abandoned (the holder crashed) and
/// may be taken over by a new caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockLease {
    pub name: String,
    /// Identifies the owning process invocation.
    pub holder: String,
    pub acquired_at: Timestamp,
    pub ttl_secs: i64,
}

impl LockLease {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.acquired_at.is_older_than(self.ttl_secs, now)
    }
}

/// Trait for lease storage operations. The obtain/release policy lives in
/// the engine's `ExclusiveLock`; backends only read and write lease records.
pub trait LockStore {
    fn read_lease(&self, name: &str) -> Result<Option<LockLease>, StoreError>;

    fn write_lease(&self, lease: &LockLease) -> Result<(), StoreError>;

    fn clear_lease(&self, name: &str) -> Result<(), StoreError>;
}
