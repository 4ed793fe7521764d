//! Durable storage for the study state behind a small key-value port.

pub mod file;
pub mod gateway;
pub mod memory;

use crate::error::Result;

pub use file::FileStore;
pub use gateway::{PersistenceGateway, Theme, STATE_KEY, THEME_KEY};
pub use memory::MemoryStore;

/// Minimal string key-value storage, shaped like browser local storage.
///
/// `set` fails with [`AppError::QuotaExceeded`](crate::error::AppError::QuotaExceeded)
/// when the value does not fit.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Bytes a stored pair counts against a quota.
pub(crate) fn footprint(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
