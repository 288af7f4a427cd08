//! Persisted block records and the block storage trait.

use crate::StoreError;
use oxpool_types::{Amount, BlockHash, MinerAddress, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Direction of a ledger entry on a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Fee,
    Input,
    Output,
    Earning,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Fee => "fee",
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Earning => "earning",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fee" => Ok(Direction::Fee),
            "input" => Ok(Direction::Input),
            "output" => Ok(Direction::Output),
            "earning" => Ok(Direction::Earning),
            other => Err(ParseError::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A direct ledger entry in the block's transaction section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub direction: Direction,
    pub address: MinerAddress,
    pub amount: Amount,
}

/// An entry in the block's address section; carries the daemon's raw
/// timestamp text, used to walk payout chains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub direction: Direction,
    pub address: MinerAddress,
    pub amount: Amount,
    pub time: String,
}

/// One resolved miner disbursement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub address: MinerAddress,
    pub time: String,
    pub amount: Amount,
}

/// The persisted form of a parsed block.
///
/// By default only `properties` and `payouts` survive persistence; the bulk
/// per-transaction and per-address detail is dropped to bound storage
/// growth. Loading a partial record yields `None` for the dropped sections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transfer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<AddressEntry>>,
    pub payouts: Vec<Payout>,
}

/// Trait for block storage operations. Blocks are keyed by hash and live
/// only as long as their owning account's hash reference.
pub trait BlockStore {
    fn load(&self, hash: &BlockHash) -> Result<StoredBlock, StoreError>;

    fn save(&self, hash: &BlockHash, block: &StoredBlock) -> Result<(), StoreError>;

    /// Delete a block. Removing a hash that is already gone is not an error.
    fn remove(&self, hash: &BlockHash) -> Result<(), StoreError>;

    fn exists(&self, hash: &BlockHash) -> Result<bool, StoreError>;

    /// Delete every stored block.
    fn truncate(&self) -> Result<(), StoreError>;
}
