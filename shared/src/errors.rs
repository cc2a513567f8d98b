use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("empty hex value")]
    Empty,
    #[error("hex value has {0} digits, at most 64 allowed")]
    TooLong(usize),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// A work request a worker refuses to search.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid target: {0}")]
    Target(#[from] HashError),
    #[error("nonce range end {end} is below start {start}")]
    InvalidRange { start: u64, end: u64 },
}
