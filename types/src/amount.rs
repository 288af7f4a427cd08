//! Fixed-point coin amounts.
//!
//! The daemon prints every amount with exactly nine decimal places
//! (`1024.000000000`). Amounts are stored as u64 nano-coin units to avoid
//! floating-point drift; the textual form round-trips losslessly.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nano-units per whole coin.
pub const NANOS_PER_COIN: u64 = 1_000_000_000;

/// A coin amount in nano-units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Whole-coin constructor, used for configuration defaults.
    pub fn from_coins(coins: u64) -> Self {
        Self(coins * NANOS_PER_COIN)
    }

    pub fn nanos(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Lossy conversion for derived percentage estimates only.
    pub fn as_coins_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_COIN as f64
    }
}

impl FromStr for Amount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::InvalidAmount(s.to_string());
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || frac_part.len() > 9
        {
            return Err(err());
        }

        let whole: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err())?
        };
        // Right-pad the fraction to nine digits: "5" means 500000000 nanos.
        let mut nanos: u64 = 0;
        if !frac_part.is_empty() {
            let padded = format!("{:0<9}", frac_part);
            nanos = padded.parse().map_err(|_| err())?;
        }

        whole
            .checked_mul(NANOS_PER_COIN)
            .and_then(|n| n.checked_add(nanos))
            .map(Self)
            .ok_or_else(err)
    }
}

impl TryFrom<String> for Amount {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Amount> for String {
    fn from(a: Amount) -> Self {
        a.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.0 / NANOS_PER_COIN,
            self.0 % NANOS_PER_COIN
        )
    }
}
