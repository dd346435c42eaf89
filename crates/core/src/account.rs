use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimal account reference as it appears on a ledger posting line:
/// the remote system's opaque id plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
}

impl AccountRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        AccountRef {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Full account metadata as returned by the ledger's account lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub account_type: String,
    pub account_subtype: Option<String>,
    pub parent_id: Option<String>,
    pub is_sub_account: bool,
    pub balance: Decimal,
}

impl AccountInfo {
    pub fn to_ref(&self) -> AccountRef {
        AccountRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}
