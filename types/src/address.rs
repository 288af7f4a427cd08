//! Miner address type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A miner address as reported by the daemon: exactly 32 characters of the
/// base64 alphabet (letters, digits, `/` and `+`).
///
/// Addresses double as storage keys; [`MinerAddress::storage_key`] returns
/// the canonical form with `/` replaced by `_` so the key is safe for file
/// names and table keys alike.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinerAddress(String);

/// Address length mandated by the daemon's output format.
pub const ADDRESS_LEN: usize = 32;

impl MinerAddress {
    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical storage key: the address with `/` normalized to `_`.
    pub fn storage_key(&self) -> String {
        self.0.replace('/', "_")
    }

    fn is_valid_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '/' || c == '+'
    }
}

impl FromStr for MinerAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ADDRESS_LEN || !s.chars().all(Self::is_valid_char) {
            return Err(ParseError::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for MinerAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MinerAddress> for String {
    fn from(a: MinerAddress) -> Self {
        a.0
    }
}

impl fmt::Display for MinerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_base64_alphabet() {
        let addr: MinerAddress = "gKNRtSL1pUaTpzMuPMznKw49ILtP6qX3".parse().unwrap();
        assert_eq!(addr.as_str().len(), 32);
    }

    #[test]
    fn storage_key_normalizes_slashes() {
        let addr: MinerAddress = "ab/cd+EF0123456789abcdefABCDEF01".parse().unwrap();
        assert_eq!(addr.storage_key(), "ab_cd+EF0123456789abcdefABCDEF01");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("short".parse::<MinerAddress>().is_err());
        assert!("gKNRtSL1pUaTpzMuPMznKw49ILtP6qX3x"
            .parse::<MinerAddress>()
            .is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!("gKNRtSL1pUaTpzMuPMznKw49ILtP6qX=".parse::<MinerAddress>().is_err());
        assert!("gKNRtSL1pUaTpzMuPMznKw49ILtP6q 3".parse::<MinerAddress>().is_err());
    }
}
