//! Abstract storage traits for the oxpool core engine.
//!
//! Every storage backend (flat JSON files, SQLite) implements these traits.
//! The rest of the codebase depends only on the traits and must not know
//! which backend is active.

pub mod account;
pub mod block;
pub mod error;
pub mod lease;

pub use account::{AccountFilter, AccountPhase, AccountRecord, AccountStore, REQUIRED_INSPECTIONS};
pub use block::{AddressEntry, BlockStore, Direction, Payout, StoredBlock, Transfer};
pub use error::StoreError;
pub use lease::{LockLease, LockStore};

/// Combined accessor trait over the three entity stores of one backend.
///
/// The lifecycle engine is generic over this trait; backends expose their
/// concrete store types through the associated types.
pub trait PoolStore {
    type Accounts: AccountStore;
    type Blocks: BlockStore;
    type Locks: LockStore;

    fn accounts(&self) -> &Self::Accounts;
    fn blocks(&self) -> &Self::Blocks;
    fn locks(&self) -> &Self::Locks;
}
