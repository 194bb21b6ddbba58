//! Shared types for accounts, entries and stats.

use crate::error::{ClientError, ClientResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest accepted score.
pub const MIN_SCORE: i64 = 1;

/// Highest accepted score.
pub const MAX_SCORE: i64 = 100;

/// Longest accepted badge label, in characters.
pub const MAX_BADGE_CHARS: usize = 32;

/// An identity owned by the authentication provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session: the account plus its bearer credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub account: Account,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns true if the access token has expired.
    /// Sessions without an expiry never expire client-side.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns true if the token will expire within the given seconds.
    pub fn expires_within_secs(&self, secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + chrono::Duration::seconds(secs) >= at)
    }
}

/// Authentication state transitions published by an auth provider.
#[derive(Clone, Debug)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

/// What happened to an entry's note on the way in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteState {
    /// Decrypted with the account key.
    Decrypted,
    /// The record has no note.
    Empty,
    /// Written before notes were encrypted; flagged as such by the server.
    LegacyPlaintext,
    /// Could not be decrypted; the note is shown as empty.
    Undecryptable,
}

/// One day's rating, with its note in plaintext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub date: NaiveDate,
    pub score: i64,
    pub badge: Option<String>,
    pub note: String,
    pub note_state: NoteState,
    pub color: Option<String>,
}

/// An entry as the entries API returns it, note still encrypted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: i64,
    pub date: String,
    pub score: i64,
    #[serde(default)]
    pub badge: Option<String>,
    /// Base64 ciphertext (or legacy plaintext when flagged).
    #[serde(default)]
    pub text: Option<String>,
    /// Nonce in whatever shape the writing client used.
    #[serde(default)]
    pub iv: Option<Value>,
    #[serde(default)]
    pub note_version: Option<u8>,
    #[serde(default)]
    pub legacy_plaintext: bool,
    #[serde(default)]
    pub color: Option<String>,
}

impl RawEntry {
    /// Parses `date`, accepting `YYYY-MM-DD` or a full ISO timestamp.
    pub fn calendar_date(&self) -> ClientResult<NaiveDate> {
        let day = self.date.get(..10).unwrap_or(&self.date);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| ClientError::RemoteRequestFailed {
            status: None,
            message: format!("malformed date {:?} on entry {}: {e}", self.date, self.id),
        })
    }
}

/// A new entry as the user entered it.
#[derive(Clone, Debug, Default)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub score: i64,
    pub badge: Option<String>,
    pub note: String,
    pub color: Option<String>,
}

impl NewEntry {
    pub fn new(date: NaiveDate, score: i64) -> Self {
        Self {
            date,
            score,
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Checks the score range and normalizes the badge.
    /// Runs before any crypto or network work.
    pub fn validate(&self) -> ClientResult<Option<String>> {
        validate_score(self.score)?;
        normalize_badge(self.badge.as_deref())
    }
}

/// Accepts scores in `MIN_SCORE..=MAX_SCORE`.
pub fn validate_score(score: i64) -> ClientResult<()> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ClientError::ValidationFailed(format!(
            "Score must be between {MIN_SCORE} and {MAX_SCORE}."
        )));
    }
    Ok(())
}

/// Trims a badge; blank becomes `None`, overlong is rejected.
pub fn normalize_badge(badge: Option<&str>) -> ClientResult<Option<String>> {
    let Some(trimmed) = badge.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_BADGE_CHARS {
        return Err(ClientError::ValidationFailed(format!(
            "Badge must be at most {MAX_BADGE_CHARS} characters."
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Body of `POST /entries`.
#[derive(Clone, Debug, Serialize)]
pub struct EntryPayload {
    pub date: String,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Base64 ciphertext.
    pub text: String,
    /// Base64 nonce.
    pub iv: String,
    pub note_version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Aggregates the entries API computes over an account's entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default, deserialize_with = "deserialize_count")]
    pub count: u64,
    #[serde(default, deserialize_with = "deserialize_opt_f64")]
    pub avg: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    pub min: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_opt_i64")]
    pub max: Option<i64>,
}

/// Entries and stats published together by one load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub entries: Vec<Entry>,
    pub stats: Stats,
}

/// Accepts a JSON number, a string-encoded number (e.g. `"72.50"`), or null.
/// Database aggregates frequently arrive string-encoded.
fn deserialize_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct LenientVisitor;
    impl<'de> de::Visitor<'de> for LenientVisitor {
        type Value = Option<f64>;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a number, a string-encoded number, or null")
        }
        fn visit_unit<E: de::Error>(self) -> Result<Option<f64>, E> { Ok(None) }
        fn visit_none<E: de::Error>(self) -> Result<Option<f64>, E> { Ok(None) }
        fn visit_some<D2: serde::Deserializer<'de>>(self, d: D2) -> Result<Option<f64>, D2::Error> {
            d.deserialize_any(LenientVisitor)
        }
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Option<f64>, E> { Ok(Some(v)) }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Option<f64>, E> { Ok(Some(v as f64)) }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Option<f64>, E> { Ok(Some(v as f64)) }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<Option<f64>, E> {
            if v.trim().is_empty() {
                return Ok(None);
            }
            v.trim().parse().map(Some).map_err(de::Error::custom)
        }
    }
    deserializer.deserialize_any(LenientVisitor)
}

fn deserialize_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match deserialize_opt_f64(deserializer)? {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 => Ok(Some(v as i64)),
        Some(v) => Err(D::Error::custom(format!("expected an integer, got {v}"))),
    }
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match deserialize_opt_i64(deserializer)? {
        None => Ok(0),
        Some(v) => u64::try_from(v).map_err(|_| D::Error::custom(format!("negative count {v}"))),
    }
}
