//! Nullable clock — deterministic time for testing.

use oxpool_types::{Clock, Timestamp};
use std::cell::Cell;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to.
pub struct NullClock {
    current: Cell<Timestamp>,
}

impl NullClock {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            current: Cell::new(initial),
        }
    }

    /// Convenience constructor from the textual timestamp form.
    ///
    /// # Panics
    /// Panics on an unparseable timestamp; tests pass literals.
    pub fn at(text: &str) -> Self {
        Self::new(text.parse().expect("valid timestamp literal"))
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: i64) {
        self.current.set(self.current.get().plus_secs(secs));
    }

    /// Set the time to a specific value.
    pub fn set(&self, to: Timestamp) {
        self.current.set(to);
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}
