pub mod account;
pub mod entry;
pub mod rule;

pub use account::{AccountInfo, AccountRef};
pub use entry::{sanitize_entry_id, Entry, EntryLine, ExtraFields, PostingType};
pub use rule::{NewRule, Rule, RuleExport, RuleUpdate};
