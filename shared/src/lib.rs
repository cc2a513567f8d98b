pub mod errors;
pub mod hash;
pub mod interaction;
pub mod log;
pub mod search;
pub mod types;

pub use primitive_types::U256;

/// Protocol version; workers must match it to connect.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
