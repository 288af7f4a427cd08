//! Named, TTL-bounded exclusive locks.
//!
//! A lock is a lease record in the active storage backend, visible to every
//! process invocation. Obtaining never blocks: if another holder's lease is
//! still within its TTL the caller gets [`LockError::AlreadyLocked`] and
//! must surface a "try again later" result instead of retrying internally.
//! A lease older than its TTL belongs to a crashed holder and is taken
//! over. Within one process the same named lock can be re-obtained (the
//! holder id matches); across processes it cannot.

use oxpool_store::{LockLease, LockStore, StoreError};
use oxpool_types::Clock;
use thiserror::Error;

/// Lock name guarding the gather operation group.
pub const GATHER_LOCK: &str = "gather";

/// Lock name guarding inspect, export, export-invalidated and the resets —
/// operations that must never interleave with each other.
pub const PROCESS_LOCK: &str = "process";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock '{0}' is held by another process")]
    AlreadyLocked(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A held lock; released on drop or explicitly.
pub struct ExclusiveLock<'a, L: LockStore> {
    store: &'a L,
    name: String,
    released: bool,
}

impl<'a, L: LockStore> ExclusiveLock<'a, L> {
    /// Acquire `name` or fail fast with [`LockError::AlreadyLocked`].
    pub fn obtain(
        store: &'a L,
        clock: &dyn Clock,
        name: &str,
        ttl_secs: i64,
    ) -> Result<Self, LockError> {
        let holder = format!("pid-{}", std::process::id());
        let now = clock.now();

        if let Some(lease) = store.read_lease(name)? {
            if lease.holder != holder && !lease.is_expired(now) {
                return Err(LockError::AlreadyLocked(name.to_string()));
            }
            if lease.holder != holder {
                tracing::warn!(
                    name,
                    abandoned_holder = %lease.holder,
                    "taking over abandoned lock"
                );
            }
        }

        store.write_lease(&LockLease {
            name: name.to_string(),
            holder,
            acquired_at: now,
            ttl_secs,
        })?;

        Ok(Self {
            store,
            name: name.to_string(),
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release explicitly, surfacing storage errors (dropping swallows them).
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        self.store.clear_lease(&self.name)
    }
}

impl<L: LockStore> Drop for ExclusiveLock<'_, L> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.store.clear_lease(&self.name) {
                tracing::warn!(name = %self.name, error = %e, "failed to release lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxpool_store::StoreError;
    use oxpool_types::Timestamp;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MemLockStore {
        leases: RefCell<HashMap<String, LockLease>>,
    }

    impl MemLockStore {
        fn new() -> Self {
            Self {
                leases: RefCell::new(HashMap::new()),
            }
        }
    }

    impl LockStore for MemLockStore {
        fn read_lease(&self, name: &str) -> Result<Option<LockLease>, StoreError> {
            Ok(self.leases.borrow().get(name).cloned())
        }

        fn write_lease(&self, lease: &LockLease) -> Result<(), StoreError> {
            self.leases
                .borrow_mut()
                .insert(lease.name.clone(), lease.clone());
            Ok(())
        }

        fn clear_lease(&self, name: &str) -> Result<(), StoreError> {
            self.leases.borrow_mut().remove(name);
            Ok(())
        }
    }

    struct FixedClock(Timestamp);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn obtain_then_release_clears_the_lease() {
        let store = MemLockStore::new();
        let clock = FixedClock(ts("2024-01-01 00:00:00"));

        let lock = ExclusiveLock::obtain(&store, &clock, PROCESS_LOCK, 300).unwrap();
        assert!(store.read_lease(PROCESS_LOCK).unwrap().is_some());
        lock.release().unwrap();
        assert!(store.read_lease(PROCESS_LOCK).unwrap().is_none());
    }

    #[test]
    fn drop_releases_the_lease() {
        let store = MemLockStore::new();
        let clock = FixedClock(ts("2024-01-01 00:00:00"));
        {
            let _lock = ExclusiveLock::obtain(&store, &clock, GATHER_LOCK, 300).unwrap();
        }
        assert!(store.read_lease(GATHER_LOCK).unwrap().is_none());
    }

    #[test]
    fn foreign_fresh_lease_blocks_acquisition() {
        let store = MemLockStore::new();
        store
            .write_lease(&LockLease {
                name: PROCESS_LOCK.to_string(),
                holder: "pid-someone-else".to_string(),
                acquired_at: ts("2024-01-01 00:00:00"),
                ttl_secs: 300,
            })
            .unwrap();

        let clock = FixedClock(ts("2024-01-01 00:02:00"));
        let result = ExclusiveLock::obtain(&store, &clock, PROCESS_LOCK, 300);
        assert!(matches!(result, Err(LockError::AlreadyLocked(_))));
    }

    #[test]
    fn expired_foreign_lease_is_taken_over() {
        let store = MemLockStore::new();
        store
            .write_lease(&LockLease {
                name: PROCESS_LOCK.to_string(),
                holder: "pid-someone-else".to_string(),
                acquired_at: ts("2024-01-01 00:00:00"),
                ttl_secs: 300,
            })
            .unwrap();

        let clock = FixedClock(ts("2024-01-01 00:06:00"));
        let lock = ExclusiveLock::obtain(&store, &clock, PROCESS_LOCK, 300).unwrap();
        let lease = store.read_lease(PROCESS_LOCK).unwrap().unwrap();
        assert_eq!(lease.holder, format!("pid-{}", std::process::id()));
        drop(lock);
    }

    #[test]
    fn own_lease_can_be_reobtained() {
        let store = MemLockStore::new();
        let clock = FixedClock(ts("2024-01-01 00:00:00"));
        let first = ExclusiveLock::obtain(&store, &clock, PROCESS_LOCK, 300).unwrap();
        // Same process, same holder id: reentrant within the call tree.
        let second = ExclusiveLock::obtain(&store, &clock, PROCESS_LOCK, 300).unwrap();
        drop(second);
        drop(first);
    }

    #[test]
    fn distinct_names_do_not_contend() {
        let store = MemLockStore::new();
        store
            .write_lease(&LockLease {
                name: PROCESS_LOCK.to_string(),
                holder: "pid-someone-else".to_string(),
                acquired_at: ts("2024-01-01 00:00:00"),
                ttl_secs: 300,
            })
            .unwrap();

        let clock = FixedClock(ts("2024-01-01 00:01:00"));
        assert!(ExclusiveLock::obtain(&store, &clock, GATHER_LOCK, 300).is_ok());
    }
}
