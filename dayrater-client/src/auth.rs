//! Authentication provider seam and its HTTP implementation.
//!
//! The client never stores credentials itself. It asks an [`AuthProvider`]
//! for the current session and listens to its [`AuthEvent`] stream, which
//! is what drives the [`SessionBinder`](crate::session::SessionBinder).
//!
//! [`PasswordAuthClient`] speaks the GoTrue-style email/password API:
//! sign-up, password grant, refresh-token grant and logout.

use crate::config::{http_client, ClientConfig};
use crate::error::{extract_error_message, ClientError, ClientResult};
use crate::types::{Account, AuthEvent, Session};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Capacity of the auth event channel. Slow listeners see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Source of sessions and authentication state changes.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session currently held by the provider, if any.
    async fn current_session(&self) -> Option<Session>;

    /// Subscribes to authentication state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Registers a new account. Returns `None` when the provider requires
    /// email confirmation before issuing a session.
    async fn sign_up(&self, email: &str, password: &str) -> ClientResult<Option<Session>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<Session>;

    /// Ends the session locally; the remote logout is best effort.
    async fn sign_out(&self) -> ClientResult<()>;

    /// Exchanges the refresh token for a new access token.
    async fn refresh_session(&self) -> ClientResult<Session>;
}

/// State shared across concurrent callers.
struct AuthState {
    session: Option<Session>,
    /// Bumped on every successful refresh so a caller waiting on the
    /// refresh lock can tell that someone else already refreshed.
    refresh_generation: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        Session {
            account: Account {
                id: self.user.id,
                email: self.user.email,
            },
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// HTTP client for an email/password authentication provider.
pub struct PasswordAuthClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    state: Arc<RwLock<AuthState>>,
    /// Serializes refreshes so concurrent callers never spend the same
    /// refresh token twice (providers rotate it on first use).
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    events: broadcast::Sender<AuthEvent>,
}

impl PasswordAuthClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            client: http_client(config)?,
            base_url: config.auth_base().to_string(),
            api_key: config.auth_api_key.clone(),
            state: Arc::new(RwLock::new(AuthState {
                session: None,
                refresh_generation: 0,
            })),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            events,
        })
    }

    /// Restores a previously saved session and announces it.
    pub async fn restore_session(&self, session: Session) {
        self.state.write().await.session = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session));
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine; the state is still updated.
        let _ = self.events.send(event);
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let req = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.header("apikey", key),
            None => req,
        }
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> ClientResult<(StatusCode, Option<TokenResponse>, String)> {
        let resp = self
            .post(&format!("/auth/v1/token?grant_type={grant_type}"))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Ok((status, None, text));
        }
        let token: TokenResponse = serde_json::from_str(&text)?;
        Ok((status, Some(token), text))
    }

    async fn store(&self, session: &Session) {
        self.state.write().await.session = Some(session.clone());
    }
}

fn auth_failure(status: StatusCode, body: &str) -> ClientError {
    ClientError::AuthFailed(
        extract_error_message(body).unwrap_or_else(|| format!("provider returned {status}")),
    )
}

#[async_trait]
impl AuthProvider for PasswordAuthClient {
    async fn current_session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> ClientResult<Option<Session>> {
        let resp = self
            .post("/auth/v1/signup")
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(auth_failure(status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.get("access_token").is_none() {
            info!("sign-up accepted, waiting for email confirmation");
            return Ok(None);
        }

        let session = serde_json::from_value::<TokenResponse>(value)?.into_session();
        self.store(&session).await;
        info!("signed up account {}", session.account.id);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(Some(session))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<Session> {
        let (status, token, body) = self
            .token_request(
                "password",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        let session = token
            .ok_or_else(|| auth_failure(status, &body))?
            .into_session();

        self.store(&session).await;
        info!("signed in account {}", session.account.id);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let previous = self.state.write().await.session.take();

        if let Some(session) = previous {
            let result = self
                .post("/auth/v1/logout")
                .bearer_auth(&session.access_token)
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("remote logout returned {}", resp.status());
                }
                Err(e) => warn!("remote logout failed: {e}"),
                Ok(_) => debug!("remote logout ok"),
            }
            info!("signed out account {}", session.account.id);
        }

        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn refresh_session(&self) -> ClientResult<Session> {
        // Capture the generation before queueing on the lock.
        let pre_gen = self.state.read().await.refresh_generation;

        let _guard = self.refresh_lock.lock().await;

        // A concurrent refresh finished while we waited: reuse its result.
        {
            let state = self.state.read().await;
            if state.refresh_generation > pre_gen {
                return state.session.clone().ok_or(ClientError::AuthRequired);
            }
        }

        let refresh_token = {
            let state = self.state.read().await;
            state
                .session
                .as_ref()
                .and_then(|s| s.refresh_token.clone())
                .ok_or(ClientError::AuthRequired)?
        };

        let (status, token, body) = self
            .token_request(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;

        let Some(token) = token else {
            if matches!(
                status,
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) {
                // Refresh token revoked or expired: the session is over.
                self.state.write().await.session = None;
                self.emit(AuthEvent::SignedOut);
            }
            return Err(auth_failure(status, &body));
        };

        let session = token.into_session();
        {
            let mut state = self.state.write().await;
            state.session = Some(session.clone());
            state.refresh_generation += 1;
        }
        debug!("refreshed session for account {}", session.account.id);
        self.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }
}
