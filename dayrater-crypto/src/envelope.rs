//! Versioned note envelope.
//!
//! The envelope is the one serialization contract for an encrypted note:
//! `{ "cipherText": base64, "nonce": base64, "version": 2 }`. Both the
//! encrypt and the decrypt path go through this type, so the nonce encoding
//! cannot drift between writer and reader.
//!
//! Records written by older clients carry the nonce in other shapes. Those
//! are classified by [`decode_wire_nonce`] and upgraded into a current
//! envelope by [`NoteEnvelope::from_wire`]. Unrecognized shapes are errors.

use crate::cipher::{self, EncryptedData, NONCE_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::NoteKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a nonce was encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceEncoding {
    /// Standard base64 text (current format).
    Base64,
    /// JSON array of byte values, e.g. `[12, 200, ...]`.
    ByteArray,
    /// Byte values joined with commas inside a string, e.g. `"12,200,..."`.
    CommaJoined,
}

impl NonceEncoding {
    /// The envelope version that writes this encoding.
    pub fn version(self) -> u8 {
        match self {
            NonceEncoding::Base64 => NoteEnvelope::CURRENT_VERSION,
            NonceEncoding::ByteArray | NonceEncoding::CommaJoined => NoteEnvelope::LEGACY_VERSION,
        }
    }
}

/// An encrypted note ready for transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEnvelope {
    /// Base64 ciphertext including the authentication tag.
    pub cipher_text: String,
    /// Base64 96-bit nonce.
    pub nonce: String,
    pub version: u8,
}

impl NoteEnvelope {
    /// Current envelope format version.
    pub const CURRENT_VERSION: u8 = 2;

    /// Version tag of records whose nonce was written as raw byte values.
    pub const LEGACY_VERSION: u8 = 1;

    /// Encrypts `plaintext` into a current-version envelope.
    pub fn seal(key: &NoteKey, plaintext: &str) -> CryptoResult<Self> {
        let encrypted = cipher::encrypt_string(key, plaintext)?;
        Ok(Self::from_encrypted_data(&encrypted))
    }

    /// Decrypts the envelope back into the note text.
    pub fn open(&self, key: &NoteKey) -> CryptoResult<String> {
        let data = self.to_encrypted_data()?;
        cipher::decrypt_string(key, &data)
    }

    pub fn from_encrypted_data(data: &EncryptedData) -> Self {
        Self {
            cipher_text: STANDARD.encode(&data.ciphertext),
            nonce: STANDARD.encode(data.nonce),
            version: Self::CURRENT_VERSION,
        }
    }

    /// Decodes the base64 fields into raw ciphertext and nonce.
    pub fn to_encrypted_data(&self) -> CryptoResult<EncryptedData> {
        if self.version != Self::CURRENT_VERSION {
            return Err(CryptoError::UnsupportedVersion(self.version));
        }
        let ciphertext = STANDARD
            .decode(&self.cipher_text)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        let nonce = decode_base64_nonce(&self.nonce)?;
        Ok(EncryptedData { nonce, ciphertext })
    }

    /// Builds an envelope from the raw `text`/`iv`/version fields of a
    /// stored record, upgrading legacy nonce encodings.
    ///
    /// A record that declares a version must use the encoding that version
    /// writes. Records without a version tag are classified by shape alone;
    /// the recognized shapes are disjoint so no guessing is involved.
    pub fn from_wire(cipher_text: &str, iv: &Value, version: Option<u8>) -> CryptoResult<Self> {
        if let Some(v) = version {
            if v != Self::CURRENT_VERSION && v != Self::LEGACY_VERSION {
                return Err(CryptoError::UnsupportedVersion(v));
            }
        }

        let (nonce, encoding) = decode_wire_nonce(iv)?;

        if let Some(v) = version {
            if encoding.version() != v {
                return Err(CryptoError::MalformedNonce(format!(
                    "{encoding:?} nonce does not match envelope version {v}"
                )));
            }
        }

        // Ciphertext has always been base64; validate it up front.
        STANDARD
            .decode(cipher_text)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;

        Ok(Self {
            cipher_text: cipher_text.to_string(),
            nonce: STANDARD.encode(nonce),
            version: Self::CURRENT_VERSION,
        })
    }
}

/// Classifies and decodes a nonce as it appears in a stored record.
pub fn decode_wire_nonce(iv: &Value) -> CryptoResult<([u8; NONCE_SIZE], NonceEncoding)> {
    match iv {
        Value::Null => Err(CryptoError::MalformedNonce("missing".into())),
        Value::String(s) if s.trim().is_empty() => {
            Err(CryptoError::MalformedNonce("empty".into()))
        }
        Value::String(s) if s.contains(',') => {
            let bytes = s
                .split(',')
                .map(|part| {
                    part.trim()
                        .parse::<u8>()
                        .map_err(|_| CryptoError::MalformedNonce(format!("bad byte {part:?}")))
                })
                .collect::<CryptoResult<Vec<u8>>>()?;
            Ok((nonce_array(&bytes)?, NonceEncoding::CommaJoined))
        }
        Value::String(s) => Ok((decode_base64_nonce(s)?, NonceEncoding::Base64)),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| CryptoError::MalformedNonce(format!("bad byte {item}")))
                })
                .collect::<CryptoResult<Vec<u8>>>()?;
            Ok((nonce_array(&bytes)?, NonceEncoding::ByteArray))
        }
        other => Err(CryptoError::MalformedNonce(format!(
            "unrecognized nonce shape: {other}"
        ))),
    }
}

fn decode_base64_nonce(encoded: &str) -> CryptoResult<[u8; NONCE_SIZE]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::MalformedNonce(e.to_string()))?;
    nonce_array(&bytes)
}

fn nonce_array(bytes: &[u8]) -> CryptoResult<[u8; NONCE_SIZE]> {
    <[u8; NONCE_SIZE]>::try_from(bytes).map_err(|_| {
        CryptoError::MalformedNonce(format!(
            "expected {NONCE_SIZE} bytes, got {}",
            bytes.len()
        ))
    })
}
