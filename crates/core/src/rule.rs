use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One pattern-to-account-pair reclassification rule, scoped to a realm
/// (one connected company). Rules are evaluated in ascending `sort_order`;
/// the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub realm_id: String,
    pub pattern: String,
    pub is_regex: bool,
    pub from_account_id: String,
    pub from_account_name: Option<String>,
    pub to_account_id: String,
    pub to_account_name: Option<String>,
    pub is_active: bool,
    pub category: Option<String>,
    pub sort_order: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for creating a rule. `sort_order` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRule {
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
    pub from_account_id: String,
    #[serde(default)]
    pub from_account_name: Option<String>,
    pub to_account_id: String,
    #[serde(default)]
    pub to_account_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Partial update. `None` leaves a field untouched; for `category` an
/// empty or whitespace-only string clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub pattern: Option<String>,
    pub is_regex: Option<bool>,
    pub from_account_id: Option<String>,
    pub from_account_name: Option<String>,
    pub to_account_id: Option<String>,
    pub to_account_name: Option<String>,
    pub is_active: Option<bool>,
    pub category: Option<String>,
}

/// Portable rule representation for import/export: no internal ids,
/// scope, or timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExport {
    pub pattern: String,
    pub from_account_id: String,
    #[serde(default)]
    pub from_account_name: Option<String>,
    pub to_account_id: String,
    #[serde(default)]
    pub to_account_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<&Rule> for RuleExport {
    fn from(r: &Rule) -> Self {
        RuleExport {
            pattern: r.pattern.clone(),
            from_account_id: r.from_account_id.clone(),
            from_account_name: r.from_account_name.clone(),
            to_account_id: r.to_account_id.clone(),
            to_account_name: r.to_account_name.clone(),
            is_active: r.is_active,
            is_regex: r.is_regex,
            category: r.category.clone(),
        }
    }
}

impl From<RuleExport> for NewRule {
    fn from(e: RuleExport) -> Self {
        NewRule {
            pattern: e.pattern,
            is_regex: e.is_regex,
            from_account_id: e.from_account_id,
            from_account_name: e.from_account_name,
            to_account_id: e.to_account_id,
            to_account_name: e.to_account_name,
            is_active: e.is_active,
            category: e.category,
        }
    }
}
