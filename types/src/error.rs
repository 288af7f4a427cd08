use thiserror::Error;

/// Parse failure for any of the textual value types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid miner address: {0}")]
    InvalidAddress(String),

    #[error("invalid block hash: {0}")]
    InvalidBlockHash(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
