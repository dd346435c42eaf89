pub mod apply;
pub mod matcher;
pub mod reconcile;
pub mod service;

use thiserror::Error;

use reclass_ledger::LedgerError;
use reclass_storage::StoreError;

pub use apply::{AppliedChange, ApplyOutcome};
pub use matcher::{match_span, matches, validate_regex, PatternProbe, RuleHit, RuleSet};
pub use reconcile::{EntryDiff, LineDiff};
pub use service::{
    default_preview_start, ImportReport, PatternMatch, PatternTestReport, Reclassifier,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
