//! The explicit client context.
//!
//! One [`DayRater`] owns everything a running client needs: configuration,
//! the auth provider, local storage, the key store, the sync client and the
//! session binder. Lifecycle:
//!
//! 1. [`DayRater::open`] (or [`DayRater::new`] with injected parts) at
//!    process start.
//! 2. [`DayRater::start`] subscribes to auth events and binds an existing
//!    session, if the provider has one.
//! 3. [`DayRater::shutdown`] stops the listener and drops the in-memory key
//!    and entries. Local storage is left as is.

use crate::api_client::EntriesApiClient;
use crate::auth::{AuthProvider, PasswordAuthClient};
use crate::config::ClientConfig;
use crate::entry_cache::EntryCache;
use crate::entry_sync::{ConfirmPrompt, DeleteOutcome, EntrySyncClient, LoadOutcome};
use crate::error::ClientResult;
use crate::key_store::KeyStore;
use crate::session::{ListenerHandle, ResetOutcome, SessionBinder, SessionState};
use crate::types::{Account, AuthEvent, Entry, NewEntry, Stats};
use crate::views::{self, ChartPoint, MonthGrid, SortOrder, StatsSummary};
use dayrater_storage::{LocalStore, MemoryLocalStore, SqliteLocalStore};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Tokens expiring within this many seconds are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 30;

pub struct DayRater {
    config: ClientConfig,
    auth: Arc<dyn AuthProvider>,
    binder: Arc<SessionBinder>,
    cache: Option<EntryCache>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl DayRater {
    /// Builds a context from injected parts.
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn LocalStore>,
    ) -> ClientResult<Self> {
        config.validate()?;

        let cache = config
            .cache_decrypted_entries
            .then(|| EntryCache::new(Arc::clone(&store)));
        let api = EntriesApiClient::new(&config)?;
        let sync = Arc::new(EntrySyncClient::new(api, cache.clone()));
        let key_store = Arc::new(KeyStore::new(store));
        let binder = Arc::new(SessionBinder::new(key_store, sync));

        Ok(Self {
            config,
            auth,
            binder,
            cache,
            listener: Mutex::new(None),
        })
    }

    /// Builds a context with the HTTP auth client and the configured
    /// local storage.
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let store: Arc<dyn LocalStore> = match &config.storage_path {
            Some(path) => Arc::new(SqliteLocalStore::open(path)?),
            None => Arc::new(MemoryLocalStore::new()),
        };
        let auth = Arc::new(PasswordAuthClient::new(&config)?);
        Self::new(config, auth, store)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts listening to auth events. Idempotent.
    pub async fn start(&self) -> ClientResult<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }
        // Subscribe before reading the current session so no sign-in
        // between the two is missed.
        *listener = Some(self.binder.spawn_listener(self.auth.subscribe()));
        drop(listener);

        if let Some(session) = self.auth.current_session().await {
            info!("binding existing session for account {}", session.account.id);
            self.binder
                .handle_auth_event(AuthEvent::SignedIn(session))
                .await?;
        }
        Ok(())
    }

    /// Stops the listener and drops the in-memory key and entries.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.stop().await;
        }
        self.binder.release().await;
        info!("client shut down");
    }

    /// Registers an account. Returns `None` while the provider waits for
    /// email confirmation.
    pub async fn sign_up(&self, email: &str, password: &str) -> ClientResult<Option<Account>> {
        let Some(session) = self.auth.sign_up(email, password).await? else {
            return Ok(None);
        };
        let account = session.account.clone();
        self.binder
            .handle_auth_event(AuthEvent::SignedIn(session))
            .await?;
        Ok(Some(account))
    }

    /// Signs in and binds the account.
    ///
    /// Fails only when the provider rejects the credentials or no note key
    /// can be provisioned. The first load after sign-in is best effort: if
    /// it fails, the account is still signed in, [`stats`](Self::stats)
    /// stays `None`, and [`load`](Self::load) reports the error on retry.
    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Account> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        let account = session.account.clone();
        self.binder
            .handle_auth_event(AuthEvent::SignedIn(session))
            .await?;
        Ok(account)
    }

    pub async fn sign_out(&self) -> ClientResult<()> {
        let result = self.auth.sign_out().await;
        self.binder.handle_auth_event(AuthEvent::SignedOut).await?;
        result
    }

    pub async fn load(&self) -> ClientResult<LoadOutcome> {
        self.refresh_if_expiring().await;
        self.binder.load().await
    }

    pub async fn save(&self, entry: &NewEntry) -> ClientResult<Entry> {
        self.refresh_if_expiring().await;
        self.binder.save(entry).await
    }

    pub async fn delete(&self, id: i64, confirm: &dyn ConfirmPrompt) -> ClientResult<DeleteOutcome> {
        self.refresh_if_expiring().await;
        self.binder.delete(id, confirm).await
    }

    pub async fn reset_encryption(&self, confirm: &dyn ConfirmPrompt) -> ClientResult<ResetOutcome> {
        self.refresh_if_expiring().await;
        self.binder.reset_encryption(confirm).await
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.binder.sync().entries().await
    }

    pub async fn stats(&self) -> Option<Stats> {
        self.binder.sync().stats().await
    }

    pub async fn stats_summary(&self) -> StatsSummary {
        StatsSummary::from_stats(self.stats().await.as_ref())
    }

    pub fn state(&self) -> SessionState {
        self.binder.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.binder.watch()
    }

    pub async fn browse(&self, badge: Option<&str>, order: SortOrder) -> Vec<Entry> {
        views::browse(&self.entries().await, badge, order)
    }

    pub async fn badges(&self) -> Vec<String> {
        views::distinct_badges(&self.entries().await)
    }

    pub async fn chart(&self) -> Vec<ChartPoint> {
        views::chart_series(&self.entries().await)
    }

    pub async fn month_grid(&self, year: i32, month: u32) -> ClientResult<MonthGrid> {
        views::month_grid(&self.entries().await, year, month)
    }

    /// The persisted entry snapshot, possibly stale. `None` when caching is
    /// off or nothing was cached yet.
    pub fn cached_entries(&self) -> ClientResult<Option<Vec<Entry>>> {
        match &self.cache {
            Some(cache) => cache.read(),
            None => Ok(None),
        }
    }

    /// Refreshes the access token ahead of an operation when it is about
    /// to expire. Failures are logged; the operation then reports
    /// `AuthRequired` on its own if the token is unusable.
    async fn refresh_if_expiring(&self) {
        let Some(session) = self.binder.session().await else {
            return;
        };
        if session.refresh_token.is_none() || !session.expires_within_secs(REFRESH_MARGIN_SECS) {
            return;
        }

        debug!("access token expiring, refreshing");
        match self.auth.refresh_session().await {
            Ok(fresh) => {
                if let Err(e) = self
                    .binder
                    .handle_auth_event(AuthEvent::TokenRefreshed(fresh))
                    .await
                {
                    warn!("failed to apply refreshed session: {e}");
                }
            }
            Err(e) => warn!("token refresh failed: {e}"),
        }
    }
}
