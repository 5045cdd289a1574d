//! Aggregate size/count value.

use serde::{Deserialize, Serialize};

/// Total size and item count of everything reachable from a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Totals {
    /// Total size in bytes of all measured leaves.
    pub size: u64,
    /// Number of leaves measured.
    pub count: u64,
}

impl Totals {
    /// The empty aggregate.
    pub const ZERO: Self = Self { size: 0, count: 0 };

    /// Create totals from raw values.
    pub const fn new(size: u64, count: u64) -> Self {
        Self { size, count }
    }

    /// Totals for a single leaf of the given size.
    pub const fn leaf(size: u64) -> Self {
        Self { size, count: 1 }
    }

    /// Add two aggregates, or `None` if either field would overflow.
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match (self.size.checked_add(rhs.size), self.count.checked_add(rhs.count)) {
            (Some(size), Some(count)) => Some(Self { size, count }),
            _ => None,
        }
    }
}
