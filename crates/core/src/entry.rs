use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::account::AccountRef;

/// Remote fields this model does not interpret, kept verbatim so a
/// full-update save can echo them back.
pub type ExtraFields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingType {
    Debit,
    Credit,
}

impl fmt::Display for PostingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostingType::Debit => write!(f, "Debit"),
            PostingType::Credit => write!(f, "Credit"),
        }
    }
}

/// One posting within a ledger entry, normalized at the collaborator
/// boundary. Lines without a description can never match a rule but are
/// kept so the whole entry round-trips through save unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryLine {
    pub line_id: Option<String>,
    pub description: Option<String>,
    pub amount: Decimal,
    pub posting_type: PostingType,
    pub account: AccountRef,
    #[serde(default)]
    pub extra: ExtraFields,
    /// Unmodeled fields from the line's posting detail (entity, class, ...).
    #[serde(default)]
    pub detail_extra: ExtraFields,
}

/// A ledger transaction fetched from the external system. Snapshots go
/// stale between preview and apply; callers must re-fetch before mutating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub date: NaiveDate,
    pub lines: Vec<EntryLine>,
    /// Remote optimistic-concurrency token, echoed back on save.
    pub sync_token: Option<String>,
    /// Entry-level remote fields (doc number, private note, ...).
    #[serde(default)]
    pub extra: ExtraFields,
}

/// Entry identifiers are opaque decimal strings in the remote system.
/// Anything else is rejected before it can reach a constructed query.
pub fn sanitize_entry_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Some(trimmed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_accepts_plain_digits() {
        assert_eq!(sanitize_entry_id("147"), Some("147"));
        assert_eq!(sanitize_entry_id(" 147 "), Some("147"));
        assert_eq!(sanitize_entry_id("0"), Some("0"));
    }

    #[test]
    fn sanitize_rejects_non_digits() {
        assert_eq!(sanitize_entry_id(""), None);
        assert_eq!(sanitize_entry_id("   "), None);
        assert_eq!(sanitize_entry_id("-1"), None);
        assert_eq!(sanitize_entry_id("147a"), None);
        assert_eq!(sanitize_entry_id("1; drop table"), None);
        assert_eq!(sanitize_entry_id("１４７"), None);
    }
}
