//! The oxpool core engine.
//!
//! Two halves. The block parser turns the daemon's free-text `block` output
//! into a structured record with derived facts: is this a rewarded main
//! block, has it been paid out, who got paid. The account lifecycle engine
//! drives every tracked address through gather → inspect →
//! validate/invalidate → export transitions, persisted durably across
//! process invocations and serialized between invocations by TTL-bounded
//! exclusive locks.

pub mod accounts;
pub mod block;
pub mod config;
pub mod error;
pub mod lock;

pub use accounts::{AccountsEngine, GatherStats, InspectStats, Summary};
pub use block::{fetch_block, Block, BlockError};
pub use config::{EngineConfig, StorageBackend};
pub use error::EngineError;
pub use lock::{ExclusiveLock, LockError, GATHER_LOCK, PROCESS_LOCK};
