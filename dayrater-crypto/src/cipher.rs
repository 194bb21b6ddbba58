//! AES-256-GCM authenticated encryption.
//!
//! Every call to [`encrypt`] draws a new random 96-bit nonce. Nonces are
//! never derived from content or from counters, so the same key can be used
//! from any number of sessions without coordination.

use crate::error::{CryptoError, CryptoResult};
use crate::key::NoteKey;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Ciphertext plus the nonce it was sealed with.
///
/// `ciphertext` carries the authentication tag as its last [`TAG_SIZE`]
/// bytes, which is the layout WebCrypto produces and expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Total encrypted size in bytes (nonce + ciphertext + tag).
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    /// Always false: even an empty plaintext produces a tag.
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn cipher_for(key: &NoteKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &NoteKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = cipher_for(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce.into(),
        ciphertext,
    })
}

/// Decrypts and authenticates `data` under `key`.
pub fn decrypt(key: &NoteKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    if data.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext(format!(
            "ciphertext shorter than the {TAG_SIZE}-byte tag ({} bytes)",
            data.ciphertext.len()
        )));
    }

    cipher_for(key)
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".into())
        })
}

/// Encrypts a UTF-8 string.
pub fn encrypt_string(key: &NoteKey, plaintext: &str) -> CryptoResult<EncryptedData> {
    encrypt(key, plaintext.as_bytes())
}

/// Decrypts data produced by [`encrypt_string`].
pub fn decrypt_string(key: &NoteKey, data: &EncryptedData) -> CryptoResult<String> {
    let bytes = decrypt(key, data)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::InvalidUtf8)
}
