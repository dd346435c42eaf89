use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use reclass_core::{AccountRef, PostingType};
use reclass_ledger::LedgerApi;

use crate::matcher::RuleSet;
use crate::EngineError;

/// One line-level proposed change: current account vs. the account the
/// first matching rule would move the posting to.
#[derive(Debug, Clone, Serialize)]
pub struct LineDiff {
    pub description: Option<String>,
    pub amount: Decimal,
    pub posting_type: PostingType,
    pub current_account: AccountRef,
    pub proposed_account: AccountRef,
    pub rule_id: i64,
    /// Byte span of the pattern match within the description.
    pub match_span: (usize, usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryDiff {
    pub entry_id: String,
    pub date: NaiveDate,
    pub lines: Vec<LineDiff>,
}

/// Read-only diff of recent entries against the active rule set.
///
/// The remote API cannot filter at line level, so filtering happens here
/// in two stages: keep entries with at least one line on `account_id`,
/// then match each such line against the rules, first match wins. Entries
/// where nothing matched are dropped entirely to keep the report signal
/// dense. Never mutates the ledger.
pub(crate) async fn preview<L: LedgerApi>(
    ledger: &L,
    rules: &RuleSet,
    account_id: &str,
    since: NaiveDate,
) -> Result<Vec<EntryDiff>, EngineError> {
    let entries = ledger.list_entries(since).await?;
    tracing::debug!(fetched = entries.len(), %since, "previewing entries");

    let mut diffs = Vec::new();
    for entry in entries {
        if !entry.lines.iter().any(|l| l.account.id == account_id) {
            continue;
        }

        let mut lines = Vec::new();
        for line in entry.lines.iter().filter(|l| l.account.id == account_id) {
            let Some(hit) = rules.first_match(&line.account.id, line.description.as_deref())
            else {
                continue;
            };
            // Display metadata for the proposed account comes from the
            // (cached) account lookup; a failure here fails the preview.
            let proposed = ledger.get_account(&hit.rule.to_account_id).await?;
            lines.push(LineDiff {
                description: line.description.clone(),
                amount: line.amount,
                posting_type: line.posting_type,
                current_account: line.account.clone(),
                proposed_account: proposed.to_ref(),
                rule_id: hit.rule.id,
                match_span: hit.span,
            });
        }

        if !lines.is_empty() {
            diffs.push(EntryDiff {
                entry_id: entry.id,
                date: entry.date,
                lines,
            });
        }
    }

    tracing::debug!(with_changes = diffs.len(), "preview complete");
    Ok(diffs)
}
