//! Shared helpers for client integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dayrater_client::{
    Account, AuthEvent, AuthProvider, CipherCodec, ClientConfig, ClientError, ClientResult, Session,
};
use dayrater_crypto::NoteKey;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointing both the entries API and the auth provider at `server`.
pub fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        api_base_url: server.uri(),
        auth_base_url: server.uri(),
        ..ClientConfig::default()
    }
}

pub fn session_for(account_id: &str, token: &str) -> Session {
    Session {
        account: Account {
            id: account_id.into(),
            email: Some(format!("{account_id}@example.com")),
        },
        access_token: token.into(),
        refresh_token: Some(format!("rt-{token}")),
        expires_at: Some(Utc::now() + Duration::hours(1)),
    }
}

pub fn expired_session(account_id: &str) -> Session {
    Session {
        expires_at: Some(Utc::now() - Duration::seconds(10)),
        ..session_for(account_id, "stale")
    }
}

pub fn codec() -> CipherCodec {
    CipherCodec::new(NoteKey::generate())
}

/// A server record whose note was sealed by `codec`.
pub fn sealed_entry(codec: &CipherCodec, id: i64, date: &str, score: i64, note: &str) -> Value {
    let envelope = codec.encrypt(note).expect("encryption must succeed");
    json!({
        "id": id,
        "date": date,
        "score": score,
        "text": envelope.cipher_text,
        "iv": envelope.nonce,
        "note_version": envelope.version,
    })
}

pub fn stats_json(count: u64, avg: f64, min: i64, max: i64) -> Value {
    json!({ "count": count, "avg": avg, "min": min, "max": max })
}

/// Mounts `GET /entries` and `GET /stats` for `token`.
pub async fn mount_load(server: &MockServer, token: &str, entries: Value, stats: Value) {
    Mock::given(method("GET"))
        .and(path("/entries"))
        .and(bearer_token(token))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(bearer_token(token))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats))
        .mount(server)
        .await;
}

/// In-process auth provider with fixed accounts.
pub struct FakeAuth {
    accounts: HashMap<String, Session>,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl FakeAuth {
    /// `accounts` maps email to the session issued on sign-in.
    pub fn new(accounts: Vec<(&str, Session)>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: accounts
                .into_iter()
                .map(|(email, s)| (email.to_string(), s))
                .collect(),
            current: Mutex::new(None),
            events,
        }
    }

    /// Pretends a session was restored from an earlier run.
    pub fn with_current(self, session: Session) -> Self {
        *self.current.lock().unwrap() = Some(session);
        self
    }

    /// Emits an event as if the provider changed state on its own.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn current_session(&self) -> Option<Session> {
        self.current.lock().unwrap().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> ClientResult<Option<Session>> {
        self.sign_in_with_password(email, password).await.map(Some)
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> ClientResult<Session> {
        let session = self
            .accounts
            .get(email)
            .cloned()
            .ok_or_else(|| ClientError::AuthFailed("Invalid login credentials".into()))?;
        *self.current.lock().unwrap() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> ClientResult<()> {
        *self.current.lock().unwrap() = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> ClientResult<Session> {
        let mut current = self.current.lock().unwrap();
        let session = current.as_mut().ok_or(ClientError::AuthRequired)?;
        session.access_token = format!("{}-refreshed", session.access_token);
        session.expires_at = Some(Utc::now() + Duration::hours(1));
        let refreshed = session.clone();
        drop(current);
        self.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
        Ok(refreshed)
    }
}
