//! Client error types.

use dayrater_crypto::CryptoError;
use dayrater_storage::StorageError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Generic message shown when a failed request carried no usable detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors surfaced by the client's public operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("local key storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("concurrent key provisioning for account {0}")]
    KeyProvisioningRace(String),

    #[error("stored key for account {account_id} is unreadable: {reason}")]
    KeyCorrupted { account_id: String, reason: String },

    #[error("note decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("remote request failed: {message}")]
    RemoteRequestFailed { status: Option<u16>, message: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// A remote failure with an HTTP status.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        ClientError::RemoteRequestFailed {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns true if the server answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::RemoteRequestFailed {
                status: Some(404),
                ..
            }
        )
    }

    /// Returns true if the user has to sign in (again) to continue.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, ClientError::AuthRequired | ClientError::AuthFailed(_))
    }

    /// Text suitable for showing to the user.
    ///
    /// Remote failures carry the server's own message when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::RemoteRequestFailed { message, .. } if !message.is_empty() => {
                message.clone()
            }
            ClientError::ValidationFailed(msg) => msg.clone(),
            ClientError::AuthRequired => "Please sign in to continue.".to_string(),
            ClientError::AuthFailed(_) => "Sign-in failed. Check your email and password.".to_string(),
            ClientError::StorageUnavailable(_) | ClientError::KeyCorrupted { .. } => {
                "Notes cannot be encrypted on this device right now.".to_string()
            }
            ClientError::DecryptionFailed(_) => "This note could not be decrypted.".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Pulls a human-readable message out of an error response body.
///
/// Understands `{"error": ...}` from the entries API and the
/// `error_description`/`msg`/`message` fields auth providers use.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::RemoteRequestFailed {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<StorageError> for ClientError {
    fn from(e: StorageError) -> Self {
        ClientError::StorageUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ClientError {
    fn from(e: tokio::task::JoinError) -> Self {
        ClientError::StorageUnavailable(format!("storage task failed: {e}"))
    }
}

impl From<CryptoError> for ClientError {
    fn from(e: CryptoError) -> Self {
        if e.is_undecryptable() {
            ClientError::DecryptionFailed(e.to_string())
        } else {
            ClientError::Crypto(e.to_string())
        }
    }
}
