//! Per-account note key provisioning.
//!
//! Each account has one [`NoteKey`] stored in local storage under
//! `key_<accountId>` as base64. The key is created on first use and never
//! leaves the device.
//!
//! Provisioning is serialized per account twice over: an async mutex keeps
//! concurrent callers in this process from generating two keys, and
//! [`LocalStore::set_if_absent`] makes the first write win across processes
//! sharing the same storage file. A caller that loses the cross-process race
//! adopts the winner's key instead of its own.

use crate::error::{ClientError, ClientResult};
use dayrater_crypto::NoteKey;
use dayrater_storage::LocalStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Local storage slot holding an account's key.
pub fn key_slot(account_id: &str) -> String {
    format!("key_{account_id}")
}

/// Where a provisioned key came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Read back from local storage.
    Loaded,
    /// Generated and persisted by this call.
    Generated,
}

/// A key returned by [`KeyStore::get_or_create_key`].
#[derive(Clone, Debug)]
pub struct ProvisionedKey {
    pub key: NoteKey,
    pub origin: KeyOrigin,
}

/// Obtains or creates per-account note keys.
pub struct KeyStore {
    store: Arc<dyn LocalStore>,
    account_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    fn account_lock(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .account_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(account_id.to_string()).or_default())
    }

    /// Drops the account's lock entry once no caller holds it any more.
    /// Clones are only taken under the map lock, so a count of one means
    /// the map owns the last reference.
    fn release_account_lock(&self, account_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .account_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(account_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(account_id);
        }
    }

    /// Returns the account's key, generating and persisting one if none
    /// exists yet.
    ///
    /// A stored value that cannot be decoded fails with
    /// [`ClientError::KeyCorrupted`]; it is never replaced implicitly,
    /// since a new key would orphan every note sealed under the old one.
    pub async fn get_or_create_key(&self, account_id: &str) -> ClientResult<ProvisionedKey> {
        let lock = self.account_lock(account_id);
        let result = {
            let _guard = lock.lock().await;
            let store = Arc::clone(&self.store);
            let account = account_id.to_string();
            match tokio::task::spawn_blocking(move || provision(store.as_ref(), &account)).await {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            }
        };
        self.release_account_lock(account_id, lock);
        result
    }

    /// Replaces the account's key with a fresh one.
    ///
    /// Irreversible: notes sealed under the previous key can no longer be
    /// decrypted. Callers must obtain explicit user confirmation first.
    pub async fn replace_key(&self, account_id: &str) -> ClientResult<NoteKey> {
        let lock = self.account_lock(account_id);
        let result = {
            let _guard = lock.lock().await;
            let fresh = NoteKey::generate();
            let encoded = Zeroizing::new(fresh.to_base64());
            let store = Arc::clone(&self.store);
            let slot = key_slot(account_id);
            match tokio::task::spawn_blocking(move || store.set(&slot, &encoded)).await {
                Ok(Ok(())) => {
                    warn!(
                        "replaced key for account {account_id}; new key {}",
                        fresh.fingerprint()
                    );
                    Ok(fresh)
                }
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        };
        self.release_account_lock(account_id, lock);
        result
    }

    /// Number of accounts with a provisioning call in progress.
    pub fn accounts_in_flight(&self) -> usize {
        self.account_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Loads or creates the key in `store`. Runs on the blocking pool: the
/// SQLite backend may wait on another process's write lock.
fn provision(store: &dyn LocalStore, account_id: &str) -> ClientResult<ProvisionedKey> {
    let slot = key_slot(account_id);
    if let Some(stored) = store.get(&slot)?.map(Zeroizing::new) {
        let key = decode_stored(account_id, &stored)?;
        debug!("loaded key {} for account {account_id}", key.fingerprint());
        return Ok(ProvisionedKey {
            key,
            origin: KeyOrigin::Loaded,
        });
    }

    let fresh = NoteKey::generate();
    let encoded = Zeroizing::new(fresh.to_base64());
    let winner = Zeroizing::new(store.set_if_absent(&slot, &encoded)?);

    // Read back: a backend that lost our write would otherwise hand out
    // a key that is not the persisted one.
    let persisted = store.get(&slot)?.map(Zeroizing::new);
    if persisted.as_deref() != Some(&*winner) {
        warn!("key slot for account {account_id} changed during provisioning");
        return Err(ClientError::KeyProvisioningRace(account_id.to_string()));
    }

    if *winner == *encoded {
        info!("generated key {} for account {account_id}", fresh.fingerprint());
        return Ok(ProvisionedKey {
            key: fresh,
            origin: KeyOrigin::Generated,
        });
    }

    let key = decode_stored(account_id, &winner)?;
    info!(
        "adopted key {} for account {account_id} written by another process",
        key.fingerprint()
    );
    Ok(ProvisionedKey {
        key,
        origin: KeyOrigin::Loaded,
    })
}

fn decode_stored(account_id: &str, stored: &str) -> ClientResult<NoteKey> {
    NoteKey::from_base64(stored.trim()).map_err(|e| ClientError::KeyCorrupted {
        account_id: account_id.to_string(),
        reason: e.to_string(),
    })
}
