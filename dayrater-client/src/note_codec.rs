//! Note encryption bound to one account's key.

use crate::error::ClientResult;
use crate::types::{Entry, NoteState, RawEntry};
use dayrater_crypto::{NoteEnvelope, NoteKey};
use serde_json::Value;
use tracing::warn;

/// Encrypts notes on write and decrypts them on read.
#[derive(Clone, Debug)]
pub struct CipherCodec {
    key: NoteKey,
}

impl CipherCodec {
    pub fn new(key: NoteKey) -> Self {
        Self { key }
    }

    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }

    /// Seals `plaintext` under a fresh nonce.
    pub fn encrypt(&self, plaintext: &str) -> ClientResult<NoteEnvelope> {
        Ok(NoteEnvelope::seal(&self.key, plaintext)?)
    }

    /// Opens a current-format note (base64 ciphertext and nonce).
    ///
    /// Wrong key, tampering or a malformed nonce all fail with
    /// [`ClientError::DecryptionFailed`](crate::ClientError::DecryptionFailed).
    pub fn decrypt(&self, cipher_text: &str, nonce: &str) -> ClientResult<String> {
        let envelope = NoteEnvelope {
            cipher_text: cipher_text.to_string(),
            nonce: nonce.to_string(),
            version: NoteEnvelope::CURRENT_VERSION,
        };
        Ok(envelope.open(&self.key)?)
    }

    /// Opens a note exactly as a record stores it, upgrading older nonce
    /// encodings.
    pub fn decrypt_wire(&self, cipher_text: &str, iv: &Value, version: Option<u8>) -> ClientResult<String> {
        let envelope = NoteEnvelope::from_wire(cipher_text, iv, version)?;
        Ok(envelope.open(&self.key)?)
    }

    /// Turns a server record into an [`Entry`].
    ///
    /// The note never fails the entry: a note that cannot be opened is
    /// shown as empty and marked [`NoteState::Undecryptable`]. Ciphertext
    /// is passed through as text only when the server flags the record as
    /// written before encryption existed. Only a malformed date is an
    /// error.
    pub fn open_entry(&self, raw: &RawEntry) -> ClientResult<Entry> {
        let date = raw.calendar_date()?;
        let (note, note_state) = self.open_note(raw);
        Ok(Entry {
            id: raw.id,
            date,
            score: raw.score,
            badge: raw.badge.clone().filter(|b| !b.trim().is_empty()),
            note,
            note_state,
            color: raw.color.clone(),
        })
    }

    fn open_note(&self, raw: &RawEntry) -> (String, NoteState) {
        let text = raw.text.as_deref().filter(|t| !t.is_empty());
        let iv = raw.iv.as_ref().filter(|iv| !iv.is_null());

        if raw.legacy_plaintext {
            return match text {
                Some(t) => (t.to_string(), NoteState::LegacyPlaintext),
                None => (String::new(), NoteState::Empty),
            };
        }

        match (text, iv) {
            (None, None) => (String::new(), NoteState::Empty),
            (Some(cipher_text), Some(iv)) => {
                match self.decrypt_wire(cipher_text, iv, raw.note_version) {
                    Ok(note) if note.is_empty() => (note, NoteState::Empty),
                    Ok(note) => (note, NoteState::Decrypted),
                    Err(e) => {
                        warn!("note of entry {} not decryptable: {e}", raw.id);
                        (String::new(), NoteState::Undecryptable)
                    }
                }
            }
            (Some(_), None) => {
                warn!("note of entry {} has no nonce", raw.id);
                (String::new(), NoteState::Undecryptable)
            }
            (None, Some(_)) => {
                warn!("note of entry {} has a nonce but no ciphertext", raw.id);
                (String::new(), NoteState::Undecryptable)
            }
        }
    }
}
