pub mod cache;
pub mod config;
pub mod http;

use chrono::NaiveDate;
use thiserror::Error;

use reclass_core::{AccountInfo, Entry};

pub use cache::CachedAccounts;
pub use config::LedgerConfig;
pub use http::HttpLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ledger returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("invalid entry id: {0}")]
    InvalidEntryId(String),
    #[error("invalid account id: {0}")]
    InvalidAccountId(String),
    #[error("malformed ledger response: {0}")]
    Decode(String),
}

/// The external accounting system, already bound to one company's
/// connection. Every call is a network round trip unless wrapped in
/// [`CachedAccounts`].
#[allow(async_fn_in_trait)]
pub trait LedgerApi {
    /// Entries with a transaction date on or after `since`.
    async fn list_entries(&self, since: NaiveDate) -> Result<Vec<Entry>, LedgerError>;

    /// Fresh fetch of a single entry. Callers must not reuse stale
    /// snapshots across a preview/apply boundary.
    async fn get_entry(&self, id: &str) -> Result<Entry, LedgerError>;

    /// Persist a locally mutated entry; returns the saved remote state.
    /// Remote fields the model does not interpret ride along in
    /// [`Entry::extra`] and its line-level maps, so the full update does
    /// not drop them.
    async fn save_entry(&self, entry: &Entry) -> Result<Entry, LedgerError>;

    async fn get_account(&self, id: &str) -> Result<AccountInfo, LedgerError>;

    /// All active accounts.
    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, LedgerError>;
}
