//! Note encryption layer for Day Rater.
//!
//! Provides client-side encryption of free-text notes using:
//! - AES-256-GCM for authenticated encryption
//! - A fresh random 96-bit nonce for every encryption call
//! - Secure key handling with zeroization
//!
//! # Architecture
//!
//! Every account owns a single random [`NoteKey`] that is generated on the
//! client and never transmitted. Notes are sealed into a versioned
//! [`NoteEnvelope`] (`{cipherText, nonce, version}`, both fields base64)
//! before they leave the device.
//!
//! Earlier client revisions wrote the nonce in other shapes (a JSON byte
//! array, or a comma-joined byte list). Those shapes are recognized
//! explicitly by [`NoteEnvelope::from_wire`] and upgraded; anything else is
//! rejected instead of being guessed at.

mod cipher;
pub mod envelope;
mod error;
mod key;

pub use cipher::{
    decrypt, decrypt_string, encrypt, encrypt_string, EncryptedData, NONCE_SIZE, TAG_SIZE,
};
pub use envelope::{decode_wire_nonce, NonceEncoding, NoteEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use key::{NoteKey, KEY_SIZE};
