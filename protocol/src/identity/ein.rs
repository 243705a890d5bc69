//! Ethereum Identity Numbers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The sequential identifier of an identity record.
///
/// Assigned from 1 upward by the registry and never reused, not even after
/// the identity it named has been destroyed. Zero is never a valid EIN.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ein(u64);

impl Ein {
    /// The first EIN a fresh registry hands out.
    pub const FIRST: Ein = Ein(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The EIN after this one, or `None` on overflow.
    pub fn checked_next(&self) -> Option<Ein> {
        self.0.checked_add(1).map(Ein)
    }

    /// The EIN as a 32-byte big-endian word, for permission preimages.
    pub fn to_word(&self) -> [u8; 32] {
        crate::permission::uint_word(self.0)
    }
}

impl fmt::Display for Ein {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Ein {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
