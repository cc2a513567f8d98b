//! Splitting a nonce range across workers.

use shared::types::NonceRange;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("invalid range: start {start}, end {end}, parts {parts}")]
    InvalidRange { start: u64, end: u64, parts: usize },
}

/// Split the inclusive range `[start, end]` into `n` contiguous, disjoint
/// ranges covering every nonce exactly once.
///
/// Every part but the last gets `size / n` nonces and the last absorbs the
/// remainder. When `n` exceeds the number of nonces, the first parts get
/// one nonce each and the rest are empty. The result always has `n` entries.
pub fn partition(start: u64, end: u64, n: usize) -> Result<Vec<NonceRange>, PartitionError> {
    if end < start || n == 0 {
        return Err(PartitionError::InvalidRange { start, end, parts: n });
    }

    // u128 so that [0, u64::MAX] (2^64 nonces) is representable
    let size = (end - start) as u128 + 1;
    let parts = n as u128;

    let mut ranges = Vec::with_capacity(n);

    if parts > size {
        for i in 0..n as u128 {
            if i < size {
                let nonce = start + i as u64;
                ranges.push(NonceRange::new(nonce, nonce));
            } else {
                ranges.push(NonceRange::EMPTY);
            }
        }
        return Ok(ranges);
    }

    let base = size / parts;
    let mut next = start as u128;
    for i in 0..parts {
        let len = if i == parts - 1 { size - base * (parts - 1) } else { base };
        let last = next + len - 1;
        ranges.push(NonceRange::new(next as u64, last as u64));
        next = last + 1;
    }

    Ok(ranges)
}
