//! Local durable storage for Day Rater.
//!
//! The client keeps a small amount of state on the device: the per-account
//! note key (`key_<accountId>`) and, optionally, a snapshot of decrypted
//! entries. Both are plain string key/value pairs, the same model a browser
//! profile's local storage offers.
//!
//! # Backends
//!
//! - [`SqliteLocalStore`]: a single SQLite file. Several processes may open
//!   the same file; [`LocalStore::set_if_absent`] is atomic across them.
//! - [`MemoryLocalStore`]: process-local, with optional quota and a
//!   "disabled" mode for exercising storage failures.

mod error;
mod memory;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryLocalStore;
pub use sqlite::SqliteLocalStore;

/// String key/value storage that survives restarts.
pub trait LocalStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Stores `value` only if `key` is empty, atomically.
    ///
    /// Returns whichever value is stored after the call: `value` if this
    /// call won, or the value another writer stored first.
    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<String>;

    /// Removes `key`. Returns true if a value was present.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists all stored keys in ascending order.
    fn keys(&self) -> StorageResult<Vec<String>>;
}
