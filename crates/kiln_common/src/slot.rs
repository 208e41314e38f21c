//! Dense slot identifiers for on-disk cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense, non-negative identifier of one cached program binary on disk.
///
/// Slot ids are unique among live entries and reused after removal. They
/// carry no meaning outside the cache directory layout.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Creates a `SlotId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the next id in sequence, or `None` at `u32::MAX`.
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Two-hex-digit shard directory name: bits 4 through 11 of the id.
    pub fn shard_name(self) -> String {
        format!("{:02x}", (self.0 >> 4) & 0xFF)
    }

    /// Eight-hex-digit entry file name.
    pub fn file_name(self) -> String {
        format!("{:08x}", self.0)
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
