//! Double SHA-256 over `block || decimal(nonce)` and the target comparison.
//!
//! Hashes and targets are fixed-width 256-bit unsigned integers, with the
//! digest read big-endian. Everything here is stateless and safe to call
//! from any thread.

use std::fmt::{Display, Formatter};

use primitive_types::U256;
use sha2::{Digest, Sha256};

use crate::errors::HashError;

/// Hash of `block` followed by the decimal form of `nonce`.
pub fn compute(block: &str, nonce: u64) -> U256 {
    let mut hasher = Sha256::new();
    hasher.update(block.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    let first = hasher.finalize();
    let second = Sha256::digest(first);
    U256::from_big_endian(second.as_slice())
}

/// `hash < target`. A zero target is never met.
pub fn meets_target(hash: &U256, target: &U256) -> bool {
    hash < target
}

/// Parse a hex encoded 256-bit value. Accepts an optional `0x` prefix and
/// up to 64 digits in either case.
pub fn parse_hex(value: &str) -> Result<U256, HashError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if digits.is_empty() {
        return Err(HashError::Empty);
    }
    if digits.len() > 64 {
        return Err(HashError::TooLong(digits.len()));
    }

    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(&padded).map_err(|err| HashError::InvalidHex(err.to_string()))?;
    Ok(U256::from_big_endian(&bytes))
}

/// 64 lowercase hex digits, the wire form of a hash or target.
pub fn to_hex(value: &U256) -> String {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    hex::encode(bytes)
}

/// Hashes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HashRate(pub f64);

impl HashRate {
    pub fn from_count(hashes: u64, elapsed: std::time::Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            Self(hashes as f64 / secs)
        } else {
            Self(0.0)
        }
    }
}

impl Display for HashRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            r if r >= 1e6 => write!(f, "{:.2} MH/s", r / 1e6),
            r if r >= 1e3 => write!(f, "{:.2} kH/s", r / 1e3),
            r => write!(f, "{:.2} H/s", r),
        }
    }
}
