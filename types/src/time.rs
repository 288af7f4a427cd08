//! Timestamps and the clock seam.
//!
//! The daemon reports times as `YYYY-MM-DD HH:MM:SS` text (block headers add
//! a fractional-second suffix), and the export ordering key is exactly that
//! textual timestamp. Internally timestamps are `chrono::NaiveDateTime` in
//! UTC, serialized back to the same second-precision text.

use crate::ParseError;
use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A UTC timestamp with second precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(inner: NaiveDateTime) -> Self {
        Self(inner)
    }

    /// Parse the daemon's timestamp text, tolerating a fractional-second
    /// suffix (`2024-01-01 00:00:00.866`). The fraction is truncated.
    pub fn parse_flexible(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        NaiveDateTime::parse_from_str(trimmed, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|dt| Self(dt.with_nanosecond(0).unwrap_or(dt)))
            .map_err(|_| ParseError::InvalidTimestamp(s.to_string()))
    }

    /// Seconds elapsed from `self` to `now`; negative when `self` is in the
    /// future.
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        (now.0 - self.0).num_seconds()
    }

    /// The timestamp `secs` seconds after this one.
    pub fn plus_secs(&self, secs: i64) -> Timestamp {
        Self(self.0 + chrono::Duration::seconds(secs))
    }

    /// Whether more than `secs` have passed since this timestamp.
    pub fn is_older_than(&self, secs: i64, now: Timestamp) -> bool {
        self.age_secs(now) > secs
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_flexible(s)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timestamp> for String {
    fn from(t: Timestamp) -> Self {
        t.to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

/// Source of the current time.
///
/// Production code uses [`SystemClock`]; tests inject a deterministic clock
/// so lifecycle timing rules can be exercised without sleeping.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = Utc::now().naive_utc();
        Timestamp(now.with_nanosecond(0).unwrap_or(now))
    }
}
