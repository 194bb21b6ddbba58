//! Note key material.

use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256-GCM key in bytes.
pub const KEY_SIZE: usize = 32;

/// A per-account AES-256-GCM key.
///
/// The raw bytes are wiped when the key is dropped, and `Debug` only ever
/// prints the fingerprint.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NoteKey {
    bytes: [u8; KEY_SIZE],
}

impl NoteKey {
    /// Generates a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self { bytes: key.into() }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Imports raw key bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Exports the raw key as standard base64 (the local storage format).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Imports a key previously exported with [`NoteKey::to_base64`].
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = NoteKey::generate();
        let b = NoteKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn base64_export_import() {
        let key = NoteKey::generate();
        let restored = NoteKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), restored.as_bytes());
        assert_eq!(key.fingerprint(), restored.fingerprint());
    }

    #[test]
    fn short_key_rejected() {
        let err = NoteKey::from_slice(&[1u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength { expected: 32, actual: 16 }
        ));
    }

    #[test]
    fn garbage_base64_rejected() {
        assert!(matches!(
            NoteKey::from_base64("not base64!!"),
            Err(CryptoError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_bytes() {
        let key = NoteKey::from_bytes([0xAB; KEY_SIZE]);
        let printed = format!("{key:?}");
        assert_eq!(
            printed,
            format!("NoteKey {{ fingerprint: {:?} }}", key.fingerprint())
        );
    }
}
