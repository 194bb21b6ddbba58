//! Binds authentication state to key provisioning and entry sync.
//!
//! ```text
//! SignedOut ──SignedIn──▶ Provisioning ──key ok──▶ Ready ──SignedOut──▶ SignedOut
//!                              │
//!                              └──key error──▶ KeyUnavailable
//! ```
//!
//! Transitions are serialized by one async mutex that is held across key
//! provisioning. A second notification for the same account that arrives
//! while provisioning is in flight therefore waits and then finds the
//! account `Ready`; it only refreshes the stored token. Entering `Ready`
//! triggers exactly one reload.
//!
//! Every reload is tied to the sync epoch read while the mutex was held.
//! Sign-out clears the sync client under the same mutex, so nothing that
//! started before it can publish entries for the account that left.

use crate::entry_sync::{ConfirmPrompt, DeleteOutcome, EntrySyncClient, LoadOutcome};
use crate::error::{ClientError, ClientResult};
use crate::key_store::{KeyOrigin, KeyStore};
use crate::note_codec::CipherCodec;
use crate::types::{Account, AuthEvent, Entry, NewEntry, Session};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Prompt shown before the account key is replaced.
pub const RESET_PROMPT: &str =
    "Reset encryption? Notes saved so far on this account can no longer be read.";

/// Where the session stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    /// Signed in; the account key is being loaded or generated.
    Provisioning { account_id: String },
    /// Key available; entries can be loaded and saved.
    Ready { account: Account, key_origin: KeyOrigin },
    /// Signed in, but no key could be provisioned. Notes are neither
    /// encrypted nor decrypted in this state.
    KeyUnavailable { account_id: String, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    Cancelled,
}

/// Session and codec of the account in `Ready`.
struct Bound {
    session: Session,
    codec: CipherCodec,
}

pub struct SessionBinder {
    key_store: Arc<KeyStore>,
    sync: Arc<EntrySyncClient>,
    bound: Mutex<Option<Bound>>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionBinder {
    pub fn new(key_store: Arc<KeyStore>, sync: Arc<EntrySyncClient>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::SignedOut);
        Self {
            key_store,
            sync,
            bound: Mutex::new(None),
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Watches state transitions.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn sync(&self) -> &Arc<EntrySyncClient> {
        &self.sync
    }

    /// The session of the account in `Ready`, if any.
    pub async fn session(&self) -> Option<Session> {
        self.bound.lock().await.as_ref().map(|b| b.session.clone())
    }

    /// Session, codec and sync epoch of the bound account.
    async fn bound_parts(&self) -> ClientResult<(Session, CipherCodec, u64)> {
        let bound = self.bound.lock().await;
        let current = bound.as_ref().ok_or(ClientError::AuthRequired)?;
        Ok((current.session.clone(), current.codec.clone(), self.sync.epoch()))
    }

    fn set_state(&self, state: SessionState) {
        debug!("session state -> {state:?}");
        self.state_tx.send_replace(state);
    }

    /// Applies one authentication event.
    ///
    /// Returns the error of key provisioning; the state reflects the
    /// outcome either way. The reload that follows provisioning is best
    /// effort: a failure is logged and leaves the published stats at
    /// `None`, and the next [`load`](Self::load) reports it.
    pub async fn handle_auth_event(&self, event: AuthEvent) -> ClientResult<()> {
        let mut bound = self.bound.lock().await;

        let session = match event {
            AuthEvent::SignedOut => {
                let was_bound = bound.take().is_some();
                self.sync.clear().await;
                self.sync.clear_cache().await;
                self.set_state(SessionState::SignedOut);
                if was_bound {
                    info!("session ended, key and entries discarded");
                }
                return Ok(());
            }
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => session,
        };

        if let Some(current) = bound.as_mut()
            && current.session.account.id == session.account.id
        {
            current.session = session;
            debug!("token updated for account {}", current.session.account.id);
            return Ok(());
        }

        if let Some(previous) = bound.take() {
            info!(
                "switching from account {} to {}",
                previous.session.account.id, session.account.id
            );
            self.sync.clear().await;
            self.sync.clear_cache().await;
        }

        let account_id = session.account.id.clone();
        self.set_state(SessionState::Provisioning {
            account_id: account_id.clone(),
        });

        let provisioned = match self.key_store.get_or_create_key(&account_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!("key provisioning failed for account {account_id}: {e}");
                self.set_state(SessionState::KeyUnavailable {
                    account_id,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let codec = CipherCodec::new(provisioned.key);
        *bound = Some(Bound {
            session: session.clone(),
            codec: codec.clone(),
        });
        self.set_state(SessionState::Ready {
            account: session.account.clone(),
            key_origin: provisioned.origin,
        });
        let epoch = self.sync.epoch();
        drop(bound);

        info!(
            "account {account_id} ready with key {} ({:?})",
            codec.key_fingerprint(),
            provisioned.origin
        );
        if let Err(e) = self.sync.load_in(epoch, Some(&session), &codec).await {
            warn!("initial load for account {account_id} failed: {e}");
        }
        Ok(())
    }

    /// Discards the bound key and published entries without touching the
    /// persisted entry cache.
    pub async fn release(&self) {
        self.bound.lock().await.take();
        self.sync.clear().await;
        self.set_state(SessionState::SignedOut);
    }

    pub async fn load(&self) -> ClientResult<LoadOutcome> {
        let (session, codec, epoch) = self.bound_parts().await?;
        self.sync.load_in(epoch, Some(&session), &codec).await
    }

    pub async fn save(&self, entry: &NewEntry) -> ClientResult<Entry> {
        // Bad input is reported before the session is even consulted.
        entry.validate()?;
        let (session, codec, epoch) = self.bound_parts().await?;
        self.sync.save_in(epoch, Some(&session), &codec, entry).await
    }

    pub async fn delete(&self, id: i64, confirm: &dyn ConfirmPrompt) -> ClientResult<DeleteOutcome> {
        let (session, codec, epoch) = self.bound_parts().await?;
        self.sync.delete_in(epoch, Some(&session), &codec, id, confirm).await
    }

    /// Replaces the account key after explicit confirmation, then reloads.
    /// Every note sealed under the old key becomes undecryptable.
    pub async fn reset_encryption(&self, confirm: &dyn ConfirmPrompt) -> ClientResult<ResetOutcome> {
        let mut bound = self.bound.lock().await;
        let current = bound.as_mut().ok_or(ClientError::AuthRequired)?;

        if !confirm.confirm(RESET_PROMPT) {
            debug!("encryption reset cancelled");
            return Ok(ResetOutcome::Cancelled);
        }

        let account = current.session.account.clone();
        let key = self.key_store.replace_key(&account.id).await?;
        current.codec = CipherCodec::new(key);
        let (session, codec) = (current.session.clone(), current.codec.clone());
        self.set_state(SessionState::Ready {
            account,
            key_origin: KeyOrigin::Generated,
        });
        let epoch = self.sync.epoch();
        drop(bound);

        if let Err(e) = self.sync.load_in(epoch, Some(&session), &codec).await {
            warn!("reload after encryption reset failed: {e}");
        }
        Ok(ResetOutcome::Reset)
    }

    /// Spawns a task applying every event from `events` until stopped.
    pub fn spawn_listener(self: &Arc<Self>, events: broadcast::Receiver<AuthEvent>) -> ListenerHandle {
        let (command_tx, command_rx) = mpsc::channel(4);
        let binder = Arc::clone(self);
        let task = tokio::spawn(async move { binder.run(events, command_rx).await });
        ListenerHandle { command_tx, task }
    }

    async fn run(&self, mut events: broadcast::Receiver<AuthEvent>, mut command_rx: mpsc::Receiver<ListenerCommand>) {
        info!("session listener started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_auth_event(event).await {
                            warn!("auth event handling failed: {e}");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("session listener missed {missed} auth events");
                    }
                    Err(RecvError::Closed) => {
                        info!("auth event channel closed, stopping session listener");
                        break;
                    }
                },
                cmd = command_rx.recv() => match cmd {
                    Some(ListenerCommand::Stop) | None => break,
                },
            }
        }
        info!("session listener stopped");
    }
}

enum ListenerCommand {
    Stop,
}

/// Handle to a running session listener.
pub struct ListenerHandle {
    command_tx: mpsc::Sender<ListenerCommand>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops the listener and waits for it to finish.
    pub async fn stop(self) {
        if self.command_tx.send(ListenerCommand::Stop).await.is_err() {
            debug!("session listener already stopped");
        }
        if let Err(e) = self.task.await {
            warn!("session listener task failed: {e}");
        }
    }
}
