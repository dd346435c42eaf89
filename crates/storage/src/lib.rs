pub mod db;
pub mod history;
pub mod rules;

use thiserror::Error;

pub use db::{create_db, create_db_in_memory, DbPool};
pub use history::{
    history_stats, list_history, log_history, log_history_batch, AccountCount, DailyCount,
    HistoryEntry, HistoryFilter, HistoryRecord, HistoryStats, Page,
};
pub use rules::{
    check_duplicate, create_rule, delete_rule, get_rule, get_rule_categories, list_rules,
    reorder_rules, toggle_rule, update_rule,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required field: {0}")]
    Validation(&'static str),
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),
    #[error("a rule with this pattern and source account already exists")]
    DuplicateRule,
    #[error("rule not found: {0}")]
    RuleNotFound(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
