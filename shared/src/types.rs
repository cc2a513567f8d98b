use std::fmt::{Display, Formatter};

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Opaque identity of a connected worker. Ordering is used to break ties
/// between candidates with equal hashes.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A contiguous run of nonces. Both `start` and `end` are inclusive.
///
/// `end < start` denotes an empty range; [`NonceRange::EMPTY`] is the
/// canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRange {
    pub start: u64,
    pub end: u64,
}

impl NonceRange {
    pub const EMPTY: NonceRange = NonceRange { start: 1, end: 0 };

    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Number of nonces covered. Saturates for the full `u64` domain.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).saturating_add(1)
        }
    }
}

impl Display for NonceRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "[]")
        } else {
            write!(f, "[{}, {}]", self.start, self.end)
        }
    }
}

/// One proof-of-work task as issued by the upstream work source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub block: String,
    pub target: U256,
    pub request_id: String,
    /// unix millis
    pub issued_at: i64,
    /// full nonce range of the round
    pub range: NonceRange,
}

/// A sub-range of a work unit handed to one worker for one round.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub work_unit: WorkUnit,
    pub range: NonceRange,
    pub worker_id: WorkerId,
}

/// A nonce proposed by a worker together with the hash it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub worker_id: WorkerId,
    pub nonce: u64,
    pub hash: U256,
}
