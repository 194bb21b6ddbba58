//! In-memory local storage.

use crate::error::{StorageError, StorageResult};
use crate::LocalStore;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local storage with an optional byte quota.
///
/// The quota counts key and value bytes together, like a browser profile's
/// local storage limit. A disabled store fails every call.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
    disabled: bool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once `quota` bytes are in use.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// A store that is switched off entirely.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, BTreeMap<String, String>>> {
        if self.disabled {
            return Err(StorageError::Unavailable("local storage is disabled".into()));
        }
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".into()))
    }

    fn check_quota(
        &self,
        entries: &BTreeMap<String, String>,
        key: &str,
        value: &str,
    ) -> StorageResult<()> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let needed = others + key.len() + value.len();
        if needed > quota {
            return Err(StorageError::QuotaExceeded { needed, quota });
        }
        Ok(())
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.lock()?;
        self.check_quota(&entries, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<String> {
        let mut entries = self.lock()?;
        if let Some(existing) = entries.get(key) {
            return Ok(existing.clone());
        }
        self.check_quota(&entries, key, value)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(value.to_string())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
