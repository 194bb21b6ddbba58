//! Encrypted sync client for Day Rater.
//!
//! A day's rating (score, optional badge, optional note) is stored by a
//! remote entries API. The note is encrypted on this device before it is
//! sent and decrypted after it is fetched; the server only ever sees
//! ciphertext.
//!
//! # Components
//!
//! - [`KeyStore`]: per-account key, created once and kept in local storage
//! - [`CipherCodec`]: note encryption under that key
//! - [`EntrySyncClient`]: load/save/delete against the entries API
//! - [`SessionBinder`]: follows auth state, provisions the key, reloads
//! - [`DayRater`]: the context that owns all of the above
//!
//! # Example
//!
//! ```no_run
//! use dayrater_client::{ClientConfig, DayRater, NewEntry};
//! use chrono::NaiveDate;
//!
//! # async fn run() -> dayrater_client::ClientResult<()> {
//! let client = DayRater::open(ClientConfig::default())?;
//! client.start().await?;
//! client.sign_in("me@example.com", "hunter22").await?;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! client.save(&NewEntry::new(day, 72).with_note("felt good")).await?;
//! # Ok(())
//! # }
//! ```

pub mod api_client;
pub mod auth;
pub mod config;
mod context;
pub mod entry_cache;
pub mod entry_sync;
pub mod error;
pub mod key_store;
pub mod note_codec;
pub mod session;
pub mod types;
pub mod views;

pub use api_client::EntriesApiClient;
pub use auth::{AuthProvider, PasswordAuthClient};
pub use config::ClientConfig;
pub use context::DayRater;
pub use entry_cache::EntryCache;
pub use entry_sync::{ConfirmPrompt, DeleteOutcome, EntrySyncClient, LoadOutcome};
pub use error::{ClientError, ClientResult};
pub use key_store::{KeyOrigin, KeyStore, ProvisionedKey};
pub use note_codec::CipherCodec;
pub use session::{ResetOutcome, SessionBinder, SessionState};
pub use types::*;
pub use views::{ChartPoint, MonthGrid, SortOrder, StatsSummary};

/// Installs a stderr log subscriber filtered by `RUST_LOG` (default
/// `info`). Calling it again is a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
