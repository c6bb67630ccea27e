//! Task priorities.

use std::fmt;

/// Scheduling priority. Lower values are started first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Bucket and policy administration, deletes. Preempts everything else.
    pub const ADMIN: Self = Self(0);
    /// Listings, downloads and existence checks.
    pub const READ: Self = Self(1);
    /// Uploads. Least preemptive.
    pub const WRITE: Self = Self(2);

    /// Creates a priority from a raw value.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw priority value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
