use dayrater_client::key_store::key_slot;
use dayrater_client::{CipherCodec, ClientError, KeyOrigin, KeyStore};
use dayrater_storage::{LocalStore, MemoryLocalStore, SqliteLocalStore, StorageResult};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn memory_store() -> (Arc<MemoryLocalStore>, KeyStore) {
    let store = Arc::new(MemoryLocalStore::new());
    let keys = KeyStore::new(store.clone());
    (store, keys)
}

/// Memory store whose writes stall like SQLite waiting on a busy lock.
struct StallingStore {
    inner: MemoryLocalStore,
    stall: Duration,
}

impl LocalStore for StallingStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        std::thread::sleep(self.stall);
        self.inner.set(key, value)
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<String> {
        std::thread::sleep(self.stall);
        self.inner.set_if_absent(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.inner.remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys()
    }
}

// ── Provisioning ──

#[tokio::test]
async fn first_call_generates_and_persists() {
    let (store, keys) = memory_store();

    let provisioned = keys.get_or_create_key("acct-a").await.unwrap();
    assert_eq!(provisioned.origin, KeyOrigin::Generated);
    assert_eq!(
        store.get(&key_slot("acct-a")).unwrap(),
        Some(provisioned.key.to_base64())
    );
}

#[tokio::test]
async fn second_call_loads_the_same_key() {
    let (_store, keys) = memory_store();

    let first = keys.get_or_create_key("acct-a").await.unwrap();
    let second = keys.get_or_create_key("acct-a").await.unwrap();
    assert_eq!(second.origin, KeyOrigin::Loaded);

    let sealed = CipherCodec::new(first.key).encrypt("felt good").unwrap();
    let opened = CipherCodec::new(second.key)
        .decrypt(&sealed.cipher_text, &sealed.nonce)
        .unwrap();
    assert_eq!(opened, "felt good");
}

#[tokio::test]
async fn accounts_get_distinct_keys() {
    let (_store, keys) = memory_store();
    let a = keys.get_or_create_key("acct-a").await.unwrap();
    let b = keys.get_or_create_key("acct-b").await.unwrap();
    assert_ne!(a.key.as_bytes(), b.key.as_bytes());
}

#[tokio::test]
async fn concurrent_first_calls_converge_on_one_key() {
    let (store, keys) = memory_store();

    let results = join_all((0..16).map(|_| keys.get_or_create_key("acct-new"))).await;
    let keys_seen: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().key.to_base64())
        .collect();

    assert!(keys_seen.iter().all(|k| *k == keys_seen[0]));
    assert_eq!(store.keys().unwrap(), vec![key_slot("acct-new")]);
    assert_eq!(store.get(&key_slot("acct-new")).unwrap().as_ref(), Some(&keys_seen[0]));
}

#[tokio::test]
async fn concurrent_calls_generate_exactly_once() {
    let (_store, keys) = memory_store();

    let results = join_all((0..8).map(|_| keys.get_or_create_key("acct-x"))).await;
    let generated = results
        .iter()
        .filter(|r| r.as_ref().unwrap().origin == KeyOrigin::Generated)
        .count();
    assert_eq!(generated, 1);
}

#[tokio::test]
async fn two_stores_on_one_file_share_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("local.db");

    let tab_a = KeyStore::new(Arc::new(SqliteLocalStore::open(&db).unwrap()));
    let tab_b = KeyStore::new(Arc::new(SqliteLocalStore::open(&db).unwrap()));

    let (a, b) = tokio::join!(
        tab_a.get_or_create_key("acct-a"),
        tab_b.get_or_create_key("acct-a")
    );
    assert_eq!(a.unwrap().key.to_base64(), b.unwrap().key.to_base64());
}

#[tokio::test]
async fn key_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("local.db");

    let first = {
        let keys = KeyStore::new(Arc::new(SqliteLocalStore::open(&db).unwrap()));
        keys.get_or_create_key("acct-a").await.unwrap()
    };

    let keys = KeyStore::new(Arc::new(SqliteLocalStore::open(&db).unwrap()));
    let again = keys.get_or_create_key("acct-a").await.unwrap();
    assert_eq!(again.origin, KeyOrigin::Loaded);
    assert_eq!(again.key.as_bytes(), first.key.as_bytes());
}

// ── Failure Modes ──

#[tokio::test]
async fn disabled_storage_is_unavailable() {
    let keys = KeyStore::new(Arc::new(MemoryLocalStore::disabled()));
    let err = keys.get_or_create_key("acct-a").await.unwrap_err();
    assert!(matches!(err, ClientError::StorageUnavailable(_)));
}

#[tokio::test]
async fn quota_exceeded_is_unavailable() {
    let keys = KeyStore::new(Arc::new(MemoryLocalStore::with_quota(8)));
    let err = keys.get_or_create_key("acct-a").await.unwrap_err();
    assert!(matches!(err, ClientError::StorageUnavailable(_)));
}

#[tokio::test]
async fn corrupt_key_is_reported_not_replaced() {
    let (store, keys) = memory_store();
    store.set(&key_slot("acct-a"), "definitely not a key").unwrap();

    let err = keys.get_or_create_key("acct-a").await.unwrap_err();
    assert!(matches!(err, ClientError::KeyCorrupted { ref account_id, .. } if account_id == "acct-a"));
    assert_eq!(
        store.get(&key_slot("acct-a")).unwrap().as_deref(),
        Some("definitely not a key")
    );
}

#[tokio::test]
async fn wrong_length_key_is_corrupt() {
    let (store, keys) = memory_store();
    store.set(&key_slot("acct-a"), "AAAA").unwrap();

    let err = keys.get_or_create_key("acct-a").await.unwrap_err();
    assert!(matches!(err, ClientError::KeyCorrupted { .. }));
}

// ── Replacement ──

#[tokio::test]
async fn replace_key_orphans_old_notes() {
    let (_store, keys) = memory_store();
    let old = keys.get_or_create_key("acct-a").await.unwrap();
    let sealed = CipherCodec::new(old.key).encrypt("before reset").unwrap();

    let new_key = keys.replace_key("acct-a").await.unwrap();
    let reloaded = keys.get_or_create_key("acct-a").await.unwrap();
    assert_eq!(reloaded.key.as_bytes(), new_key.as_bytes());

    let err = CipherCodec::new(new_key)
        .decrypt(&sealed.cipher_text, &sealed.nonce)
        .unwrap_err();
    assert!(matches!(err, ClientError::DecryptionFailed(_)));
}

// ── Runtime ──

#[tokio::test]
async fn stalled_storage_does_not_block_the_runtime() {
    let keys = KeyStore::new(Arc::new(StallingStore {
        inner: MemoryLocalStore::new(),
        stall: Duration::from_millis(300),
    }));
    let finished = Mutex::new(Vec::new());

    // Single-threaded runtime: the timer only fires while provisioning is
    // stalled if the store call runs off the runtime thread.
    tokio::join!(
        async {
            keys.get_or_create_key("acct-a").await.unwrap();
            finished.lock().unwrap().push("provision");
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finished.lock().unwrap().push("timer");
        },
    );

    assert_eq!(*finished.lock().unwrap(), vec!["timer", "provision"]);
}

#[tokio::test]
async fn stalled_replace_does_not_block_the_runtime() {
    let keys = KeyStore::new(Arc::new(StallingStore {
        inner: MemoryLocalStore::new(),
        stall: Duration::from_millis(300),
    }));
    let finished = Mutex::new(Vec::new());

    tokio::join!(
        async {
            keys.replace_key("acct-a").await.unwrap();
            finished.lock().unwrap().push("replace");
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finished.lock().unwrap().push("timer");
        },
    );

    assert_eq!(*finished.lock().unwrap(), vec!["timer", "replace"]);
}

// ── Lock Bookkeeping ──

#[tokio::test]
async fn account_locks_are_released_after_provisioning() {
    let (_store, keys) = memory_store();

    for i in 0..50 {
        keys.get_or_create_key(&format!("acct-{i}")).await.unwrap();
    }
    assert_eq!(keys.accounts_in_flight(), 0);
}

#[tokio::test]
async fn account_locks_are_released_after_concurrent_calls() {
    let (_store, keys) = memory_store();

    let accounts = ["acct-a", "acct-b"];
    let results = join_all((0..8).map(|i| keys.get_or_create_key(accounts[i % 2]))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    keys.replace_key("acct-a").await.unwrap();
    assert_eq!(keys.accounts_in_flight(), 0);
}

#[tokio::test]
async fn account_locks_are_released_after_failures() {
    let keys = KeyStore::new(Arc::new(MemoryLocalStore::disabled()));
    assert!(keys.get_or_create_key("acct-a").await.is_err());
    assert!(keys.replace_key("acct-a").await.is_err());
    assert_eq!(keys.accounts_in_flight(), 0);
}
