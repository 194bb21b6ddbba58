//! Optional local snapshot of decrypted entries.
//!
//! Secondary views may read entries without a network round trip. The
//! snapshot is never authoritative and the sync path never reads it. It
//! holds plaintext notes, so it is only written when the config opts in.
//!
//! Writes and removals run on the blocking pool, since the SQLite backend
//! may wait on a file lock held by another process.

use crate::error::ClientResult;
use crate::types::Entry;
use dayrater_storage::LocalStore;
use std::sync::Arc;
use tracing::warn;

/// Local storage slot of the snapshot.
pub const ENTRIES_CACHE_KEY: &str = "entries";

#[derive(Clone)]
pub struct EntryCache {
    store: Arc<dyn LocalStore>,
}

impl EntryCache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub async fn write(&self, entries: &[Entry]) -> ClientResult<()> {
        let json = serde_json::to_string(entries)?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.set(ENTRIES_CACHE_KEY, &json)).await??;
        Ok(())
    }

    /// Reads the snapshot. An unreadable snapshot reads as absent.
    pub fn read(&self) -> ClientResult<Option<Vec<Entry>>> {
        let Some(json) = self.store.get(ENTRIES_CACHE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                warn!("ignoring unreadable entry cache: {e}");
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> ClientResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.remove(ENTRIES_CACHE_KEY)).await??;
        Ok(())
    }
}
