//! Block hash type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A block hash: 64 lowercase hex characters, exactly as the daemon prints
/// it in block headers.
///
/// The daemon's casing is inconsistent across versions, so parsing folds
/// input to lowercase before validating.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockHash(String);

/// Hash length in hex characters.
pub const HASH_LEN: usize = 64;

impl BlockHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BlockHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.len() != HASH_LEN
            || !lower.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(ParseError::InvalidBlockHash(s.to_string()));
        }
        Ok(Self(lower))
    }
}

impl TryFrom<String> for BlockHash {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<BlockHash> for String {
    fn from(h: BlockHash) -> Self {
        h.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "74c7e08b2e8f0700d47ef880779ecfeeae1f937a5f304e0a22ffd0d5e4406e56";

    #[test]
    fn parses_and_round_trips() {
        let hash: BlockHash = HASH.parse().unwrap();
        assert_eq!(hash.to_string(), HASH);
    }

    #[test]
    fn folds_uppercase_input() {
        let hash: BlockHash = HASH.to_ascii_uppercase().parse().unwrap();
        assert_eq!(hash.as_str(), HASH);
    }

    #[test]
    fn rejects_bad_input() {
        assert!("deadbeef".parse::<BlockHash>().is_err());
        let bad = format!("{}g", &HASH[..63]);
        assert!(bad.parse::<BlockHash>().is_err());
    }
}
