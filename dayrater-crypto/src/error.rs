//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during note encryption and decryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("malformed nonce: {0}")]
    MalformedNonce(String),

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("decrypted note is not valid UTF-8")]
    InvalidUtf8,
}

impl CryptoError {
    /// Returns true if this error means stored ciphertext could not be
    /// turned back into a note (wrong key, tampering, or a bad envelope).
    pub fn is_undecryptable(&self) -> bool {
        matches!(
            self,
            CryptoError::Decryption(_)
                | CryptoError::MalformedNonce(_)
                | CryptoError::MalformedCiphertext(_)
                | CryptoError::UnsupportedVersion(_)
                | CryptoError::InvalidUtf8
        )
    }
}
