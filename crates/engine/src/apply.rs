use rust_decimal::Decimal;
use serde::Serialize;

use reclass_core::{sanitize_entry_id, AccountRef};
use reclass_ledger::LedgerApi;
use reclass_storage::{log_history_batch, DbPool, HistoryRecord};

use crate::matcher::RuleSet;
use crate::EngineError;

/// One line change that was written back to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedChange {
    pub entry_id: String,
    pub line_description: Option<String>,
    pub amount: Decimal,
    pub from_account: AccountRef,
    pub to_account: AccountRef,
    pub rule_id: i64,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub changes: Vec<AppliedChange>,
    /// Ids dropped at the boundary for not being plain decimal strings.
    pub skipped_invalid: usize,
}

/// Apply the rule set to a batch of approved entry ids.
///
/// Each entry is processed independently: re-fetched fresh (preview
/// snapshots may be stale), re-matched, mutated in memory and saved.
/// Failures after the fetch abort only that entry; the batch continues.
/// History records are queued as lines are mutated — before the save, so
/// an entry whose save fails still leaves its audit trail — and committed
/// in a single transaction once the whole batch is done.
pub(crate) async fn apply_batch<L: LedgerApi>(
    ledger: &L,
    pool: &DbPool,
    realm: &str,
    rules: &RuleSet,
    entry_ids: &[String],
) -> Result<ApplyOutcome, EngineError> {
    let mut outcome = ApplyOutcome::default();
    let mut queued: Vec<HistoryRecord> = Vec::new();

    for raw in entry_ids {
        let Some(id) = sanitize_entry_id(raw) else {
            tracing::warn!(entry = %raw, "dropping malformed entry id");
            outcome.skipped_invalid += 1;
            continue;
        };

        match apply_one(ledger, realm, rules, id, &mut queued).await {
            Ok(changes) => outcome.changes.extend(changes),
            Err(e) => {
                tracing::error!(entry = id, error = %e, "entry update failed, continuing batch");
            }
        }
    }

    log_history_batch(pool, &queued).await?;

    tracing::info!(
        applied = outcome.changes.len(),
        skipped_invalid = outcome.skipped_invalid,
        "apply batch complete"
    );
    Ok(outcome)
}

struct PlannedChange {
    line_index: usize,
    to_account: AccountRef,
    rule_id: i64,
}

async fn apply_one<L: LedgerApi>(
    ledger: &L,
    realm: &str,
    rules: &RuleSet,
    id: &str,
    queued: &mut Vec<HistoryRecord>,
) -> Result<Vec<AppliedChange>, EngineError> {
    let mut entry = ledger.get_entry(id).await?;

    // Resolve every destination account before touching the entry, so an
    // unresolvable account fails the whole entry instead of applying it
    // half-way.
    let mut planned = Vec::new();
    for (line_index, line) in entry.lines.iter().enumerate() {
        let Some(hit) = rules.first_match(&line.account.id, line.description.as_deref()) else {
            continue;
        };
        let to_account = ledger.get_account(&hit.rule.to_account_id).await?.to_ref();
        planned.push(PlannedChange {
            line_index,
            to_account,
            rule_id: hit.rule.id,
        });
    }

    if planned.is_empty() {
        return Ok(Vec::new());
    }

    let mut changes = Vec::with_capacity(planned.len());
    for plan in &planned {
        let line = &mut entry.lines[plan.line_index];
        let from_account = std::mem::replace(&mut line.account, plan.to_account.clone());

        queued.push(HistoryRecord {
            realm_id: realm.to_string(),
            entry_id: entry.id.clone(),
            entry_date: Some(entry.date),
            line_description: line.description.clone(),
            from_account: from_account.clone(),
            to_account: plan.to_account.clone(),
            amount: Some(line.amount),
            rule_id: Some(plan.rule_id),
        });
        changes.push(AppliedChange {
            entry_id: entry.id.clone(),
            line_description: line.description.clone(),
            amount: line.amount,
            from_account,
            to_account: plan.to_account.clone(),
            rule_id: plan.rule_id,
        });
    }

    ledger.save_entry(&entry).await?;
    Ok(changes)
}
