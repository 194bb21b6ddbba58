mod support;

use dayrater_client::{AuthEvent, AuthProvider, ClientConfig, ClientError, PasswordAuthClient};
use serde_json::json;
use std::sync::Arc;
use support::{config_for, session_for};
use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_response(user_id: &str, access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": refresh,
        "user": { "id": user_id, "email": format!("{user_id}@example.com") }
    })
}

fn client_for(server: &MockServer) -> PasswordAuthClient {
    PasswordAuthClient::new(&config_for(server)).unwrap()
}

// ── Sign In ──

#[tokio::test]
async fn no_session_initially() {
    let server = MockServer::start().await;
    assert!(client_for(&server).current_session().await.is_none());
}

#[tokio::test]
async fn password_sign_in_stores_session_and_emits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({"email": "a@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("acct-a", "at-1", "rt-1")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut events = client.subscribe();

    let session = client.sign_in_with_password("a@example.com", "pw").await.unwrap();
    assert_eq!(session.account.id, "acct-a");
    assert_eq!(session.access_token, "at-1");
    assert!(!session.is_expired());
    assert!(session.expires_at.is_some());

    match events.recv().await.unwrap() {
        AuthEvent::SignedIn(s) => assert_eq!(s.account.id, "acct-a"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        client.current_session().await.map(|s| s.access_token),
        Some("at-1".to_string())
    );
}

#[tokio::test]
async fn api_key_header_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("acct-a", "at", "rt")))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig {
        auth_api_key: Some("anon-key".into()),
        ..config_for(&server)
    };
    let client = PasswordAuthClient::new(&config).unwrap();
    client.sign_in_with_password("a@example.com", "pw").await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_are_auth_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.sign_in_with_password("a@example.com", "wrong").await.unwrap_err();
    match err {
        ClientError::AuthFailed(msg) => assert_eq!(msg, "Invalid login credentials"),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(client.current_session().await.is_none());
}

// ── Sign Up ──

#[tokio::test]
async fn sign_up_with_immediate_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("acct-n", "at", "rt")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.sign_up("n@example.com", "pw").await.unwrap();
    assert_eq!(session.map(|s| s.account.id), Some("acct-n".to_string()));
}

#[tokio::test]
async fn sign_up_pending_confirmation_has_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "acct-n",
            "email": "n@example.com",
            "confirmation_sent_at": "2024-05-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.sign_up("n@example.com", "pw").await.unwrap().is_none());
    assert!(client.current_session().await.is_none());
}

#[tokio::test]
async fn sign_up_error_uses_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"msg": "User already registered"})))
        .mount(&server)
        .await;

    let err = client_for(&server).sign_up("n@example.com", "pw").await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(ref m) if m == "User already registered"));
}

// ── Sign Out ──

#[tokio::test]
async fn sign_out_clears_even_if_remote_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(bearer_token("at-1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.restore_session(session_for("acct-a", "at-1")).await;
    let mut events = client.subscribe();

    client.sign_out().await.unwrap();
    assert!(client.current_session().await.is_none());
    assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut));
}

// ── Refresh ──

#[tokio::test]
async fn refresh_rotates_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "rt-at-old"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("acct-a", "at-new", "rt-new")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.restore_session(session_for("acct-a", "at-old")).await;
    let mut events = client.subscribe();

    let refreshed = client.refresh_session().await.unwrap();
    assert_eq!(refreshed.access_token, "at-new");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rt-new"));
    assert!(matches!(events.recv().await.unwrap(), AuthEvent::TokenRefreshed(_)));
}

#[tokio::test]
async fn concurrent_refreshes_spend_the_token_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_response("acct-a", "at-new", "rt-new"))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    client.restore_session(session_for("acct-a", "at-old")).await;

    let results = futures::future::join_all((0..5).map(|_| client.refresh_session())).await;
    for result in results {
        assert_eq!(result.unwrap().access_token, "at-new");
    }
}

#[tokio::test]
async fn revoked_refresh_token_ends_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.restore_session(session_for("acct-a", "at-old")).await;
    let mut events = client.subscribe();

    let err = client.refresh_session().await.unwrap_err();
    assert!(err.requires_sign_in());
    assert!(client.current_session().await.is_none());
    assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedOut));
}

#[tokio::test]
async fn refresh_without_session_is_auth_required() {
    let server = MockServer::start().await;
    let err = client_for(&server).refresh_session().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthRequired));
    assert!(server.received_requests().await.unwrap().is_empty());
}
