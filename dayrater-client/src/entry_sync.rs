//! Load, save and delete against the entries API with note encryption.
//!
//! # Publication
//!
//! A load fetches entries and stats concurrently and publishes them
//! together or not at all. Every load takes a sequence number; when a load
//! finishes after a newer one was issued, its result is discarded instead
//! of overwriting newer state.
//!
//! Published state also belongs to an epoch. [`EntrySyncClient::clear`]
//! starts a new epoch, and a load, save or delete tied to an earlier epoch
//! never publishes or caches anything afterwards. That covers loads still
//! in flight at sign-out as well as reloads issued after it by a save or
//! delete that started before it. Callers holding a session lock capture
//! the epoch with [`EntrySyncClient::epoch`] under that lock and pass it to
//! the `*_in` variants.
//!
//! A failed load resets the published state to "no entries, no stats"
//! rather than leaving stale data on screen.

use crate::api_client::EntriesApiClient;
use crate::entry_cache::EntryCache;
use crate::error::{ClientError, ClientResult};
use crate::note_codec::CipherCodec;
use crate::types::{Entry, EntryPayload, NewEntry, NoteState, Session, Snapshot, Stats};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Prompt shown before an entry is deleted.
pub const DELETE_PROMPT: &str = "Delete this entry?";

/// Asks the user to confirm a destructive action.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// Result of a load that completed.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    /// This load was the latest; its snapshot is now published.
    Published(Snapshot),
    /// A newer load (or a sign-out) superseded this one. `seq` is 0 when
    /// the load was never issued because its epoch had already ended.
    Discarded { seq: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; nothing was sent.
    Cancelled,
}

#[derive(Default)]
struct SyncState {
    entries: Vec<Entry>,
    /// `None` until a load succeeds, and again after a failed load.
    stats: Option<Stats>,
}

/// Syncs entries with the remote API, encrypting notes on the way out and
/// decrypting them on the way in.
pub struct EntrySyncClient {
    api: EntriesApiClient,
    state: RwLock<SyncState>,
    latest_seq: AtomicU64,
    epoch: AtomicU64,
    cache: Option<EntryCache>,
    /// Orders cache writes against [`EntrySyncClient::clear_cache`].
    cache_gate: Mutex<()>,
}

/// Rejects a missing or expired credential before any request is built.
fn usable(credential: Option<&Session>) -> ClientResult<&Session> {
    match credential {
        Some(session) if !session.is_expired() && !session.access_token.is_empty() => Ok(session),
        Some(_) => {
            debug!("credential expired");
            Err(ClientError::AuthRequired)
        }
        None => Err(ClientError::AuthRequired),
    }
}

impl EntrySyncClient {
    pub fn new(api: EntriesApiClient, cache: Option<EntryCache>) -> Self {
        Self {
            api,
            state: RwLock::new(SyncState::default()),
            latest_seq: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            cache,
            cache_gate: Mutex::new(()),
        }
    }

    /// Currently published entries.
    pub async fn entries(&self) -> Vec<Entry> {
        self.state.read().await.entries.clone()
    }

    /// Currently published stats, `None` if nothing valid is loaded.
    pub async fn stats(&self) -> Option<Stats> {
        self.state.read().await.stats.clone()
    }

    /// Sequence number of the most recently issued load.
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq.load(Ordering::SeqCst)
    }

    /// Current epoch. Advanced by every [`clear`](Self::clear).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Fetches entries and stats and publishes them if this load is still
    /// the latest one.
    pub async fn load(&self, credential: Option<&Session>, codec: &CipherCodec) -> ClientResult<LoadOutcome> {
        self.load_in(self.epoch(), credential, codec).await
    }

    /// Like [`load`](Self::load), but discards the result unless `epoch` is
    /// still current when it would be published.
    pub async fn load_in(
        &self,
        epoch: u64,
        credential: Option<&Session>,
        codec: &CipherCodec,
    ) -> ClientResult<LoadOutcome> {
        let session = usable(credential)?;
        let seq = {
            // Checked under the state lock so a concurrent `clear` cannot
            // slip between the epoch check and the sequence bump.
            let _state = self.state.read().await;
            if self.epoch() != epoch {
                debug!("load for ended epoch {epoch} not issued");
                return Ok(LoadOutcome::Discarded { seq: 0 });
            }
            self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1
        };
        debug!("load #{seq} for account {}", session.account.id);

        let result = self.fetch_snapshot(session, codec).await;

        let mut state = self.state.write().await;
        if self.latest_seq.load(Ordering::SeqCst) != seq || self.epoch() != epoch {
            debug!("load #{seq} superseded, discarding result");
            return Ok(LoadOutcome::Discarded { seq });
        }

        match result {
            Ok(snapshot) => {
                state.entries = snapshot.entries.clone();
                state.stats = Some(snapshot.stats.clone());
                drop(state);
                debug!("load #{seq} published {} entries", snapshot.entries.len());
                self.write_cache(epoch, &snapshot.entries).await;
                Ok(LoadOutcome::Published(snapshot))
            }
            Err(e) => {
                state.entries.clear();
                state.stats = None;
                warn!("load #{seq} failed, state reset: {e}");
                Err(e)
            }
        }
    }

    async fn write_cache(&self, epoch: u64, entries: &[Entry]) {
        let Some(cache) = &self.cache else {
            return;
        };
        let _gate = self.cache_gate.lock().await;
        if self.epoch() != epoch {
            debug!("epoch {epoch} ended before the cache write");
            return;
        }
        if let Err(e) = cache.write(entries).await {
            warn!("failed to write entry cache: {e}");
        }
    }

    async fn fetch_snapshot(&self, session: &Session, codec: &CipherCodec) -> ClientResult<Snapshot> {
        let token = session.access_token.as_str();
        let account_id = session.account.id.as_str();
        let (raw_entries, stats) = tokio::try_join!(
            self.api.list_entries(token, account_id),
            self.api.get_stats(token, account_id),
        )?;

        let entries = raw_entries
            .iter()
            .map(|raw| codec.open_entry(raw))
            .collect::<ClientResult<Vec<_>>>()?;

        let undecryptable = entries
            .iter()
            .filter(|e| e.note_state == NoteState::Undecryptable)
            .count();
        if undecryptable > 0 {
            warn!("{undecryptable} of {} notes could not be decrypted", entries.len());
        }

        Ok(Snapshot { entries, stats })
    }

    /// Validates, encrypts and submits a new entry, then reloads.
    ///
    /// Returns the saved entry with its plaintext note. A failing reload
    /// does not fail the save; it leaves the published state reset.
    pub async fn save(&self, credential: Option<&Session>, codec: &CipherCodec, entry: &NewEntry) -> ClientResult<Entry> {
        self.save_in(self.epoch(), credential, codec, entry).await
    }

    /// Like [`save`](Self::save); the reload only publishes while `epoch`
    /// is current.
    pub async fn save_in(
        &self,
        epoch: u64,
        credential: Option<&Session>,
        codec: &CipherCodec,
        entry: &NewEntry,
    ) -> ClientResult<Entry> {
        let badge = entry.validate()?;
        let session = usable(credential)?;

        let envelope = codec.encrypt(&entry.note)?;
        let payload = EntryPayload {
            date: entry.date.format("%Y-%m-%d").to_string(),
            score: entry.score,
            badge: badge.clone(),
            text: envelope.cipher_text,
            iv: envelope.nonce,
            note_version: envelope.version,
            color: entry.color.clone(),
        };

        let id = self.api.create_entry(&session.access_token, &payload).await?;
        info!("saved entry {id} for {}", payload.date);

        if let Err(e) = self.load_in(epoch, credential, codec).await {
            warn!("reload after save failed: {e}");
        }

        Ok(Entry {
            id,
            date: entry.date,
            score: entry.score,
            badge,
            note: entry.note.clone(),
            note_state: if entry.note.is_empty() {
                NoteState::Empty
            } else {
                NoteState::Decrypted
            },
            color: entry.color.clone(),
        })
    }

    /// Deletes an entry after the user confirms, then reloads whether or
    /// not the delete succeeded.
    pub async fn delete(
        &self,
        credential: Option<&Session>,
        codec: &CipherCodec,
        id: i64,
        confirm: &dyn ConfirmPrompt,
    ) -> ClientResult<DeleteOutcome> {
        self.delete_in(self.epoch(), credential, codec, id, confirm).await
    }

    /// Like [`delete`](Self::delete); the reload only publishes while
    /// `epoch` is current.
    pub async fn delete_in(
        &self,
        epoch: u64,
        credential: Option<&Session>,
        codec: &CipherCodec,
        id: i64,
        confirm: &dyn ConfirmPrompt,
    ) -> ClientResult<DeleteOutcome> {
        let session = usable(credential)?;
        if !confirm.confirm(DELETE_PROMPT) {
            debug!("delete of entry {id} cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        let result = self.api.delete_entry(&session.access_token, id).await;
        match &result {
            Ok(()) => info!("deleted entry {id}"),
            Err(e) => warn!("delete of entry {id} failed: {e}"),
        }

        if let Err(e) = self.load_in(epoch, credential, codec).await {
            warn!("reload after delete failed: {e}");
        }

        result.map(|()| DeleteOutcome::Deleted)
    }

    /// Drops published entries and stats and starts a new epoch, which
    /// supersedes in-flight loads and reloads of earlier operations.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        self.latest_seq.fetch_add(1, Ordering::SeqCst);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *state = SyncState::default();
        debug!("sync state cleared, epoch {epoch}");
    }

    /// Removes the persisted entry snapshot, if caching is enabled.
    pub async fn clear_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let _gate = self.cache_gate.lock().await;
        if let Err(e) = cache.clear().await {
            warn!("failed to clear entry cache: {e}");
        }
    }
}
