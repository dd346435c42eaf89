use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

use reclass_core::{sanitize_entry_id, NewRule, PostingType, Rule, RuleExport, RuleUpdate};
use reclass_ledger::{CachedAccounts, LedgerApi};
use reclass_storage::{
    self as storage, DbPool, HistoryEntry, HistoryFilter, HistoryStats, Page, StoreError,
};

use crate::apply::{apply_batch, ApplyOutcome};
use crate::matcher::{PatternProbe, RuleSet};
use crate::reconcile::{self, EntryDiff};
use crate::EngineError;

/// Pattern tests return at most this many matched lines; the report still
/// carries the full match count.
const PATTERN_TEST_CAP: usize = 50;

/// How many per-item error messages a bulk import collects.
const IMPORT_ERROR_CAP: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub entry_id: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub match_start: usize,
    pub match_end: usize,
    pub amount: Decimal,
    pub posting_type: PostingType,
}

#[derive(Debug, Serialize)]
pub struct PatternTestReport {
    pub matches: Vec<PatternMatch>,
    pub total_matches: usize,
    pub truncated: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Default reporting window: the first day of the month before `today`.
pub fn default_preview_start(today: NaiveDate) -> NaiveDate {
    let first_of_month = today.with_day(1).unwrap_or(today);
    let last_of_prev = first_of_month.pred_opt().unwrap_or(first_of_month);
    last_of_prev.with_day(1).unwrap_or(last_of_prev)
}

/// The contract surface the application layer calls. Owns the database
/// pool and the (typically cache-wrapped) ledger collaborator for one
/// connected company; the tenant scope (`realm`) is an explicit parameter
/// on every store-touching call.
pub struct Reclassifier<L> {
    ledger: L,
    db: DbPool,
}

impl<L: LedgerApi> Reclassifier<L> {
    pub fn new(ledger: L, db: DbPool) -> Self {
        Reclassifier { ledger, db }
    }

    /// Wrap the collaborator in a time-based account cache before
    /// constructing the facade.
    pub fn with_cached_accounts(
        ledger: L,
        account_ttl: Duration,
        db: DbPool,
    ) -> Reclassifier<CachedAccounts<L>> {
        Reclassifier::new(CachedAccounts::new(ledger, account_ttl), db)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ── Rules ────────────────────────────────────────────────────────────

    pub async fn list_rules(&self, realm: &str, active_only: bool) -> Result<Vec<Rule>, EngineError> {
        Ok(storage::list_rules(&self.db, realm, active_only).await?)
    }

    pub async fn get_rule(&self, id: i64) -> Result<Rule, EngineError> {
        Ok(storage::get_rule(&self.db, id).await?)
    }

    pub async fn create_rule(&self, realm: &str, new: NewRule) -> Result<Rule, EngineError> {
        Ok(storage::create_rule(&self.db, realm, new).await?)
    }

    pub async fn update_rule(&self, id: i64, update: RuleUpdate) -> Result<Rule, EngineError> {
        Ok(storage::update_rule(&self.db, id, update).await?)
    }

    pub async fn delete_rule(&self, id: i64) -> Result<(), EngineError> {
        Ok(storage::delete_rule(&self.db, id).await?)
    }

    pub async fn toggle_rule(&self, id: i64) -> Result<Rule, EngineError> {
        Ok(storage::toggle_rule(&self.db, id).await?)
    }

    pub async fn reorder_rules(&self, realm: &str, ordered_ids: &[i64]) -> Result<(), EngineError> {
        Ok(storage::reorder_rules(&self.db, realm, ordered_ids).await?)
    }

    pub async fn categories(&self, realm: &str) -> Result<Vec<String>, EngineError> {
        Ok(storage::get_rule_categories(&self.db, realm).await?)
    }

    pub async fn check_duplicate(
        &self,
        realm: &str,
        pattern: &str,
        from_account_id: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, EngineError> {
        Ok(storage::check_duplicate(&self.db, realm, pattern, from_account_id, exclude_id).await?)
    }

    // ── Reconciliation ───────────────────────────────────────────────────

    /// Read-only preview of what the active rule set would change on the
    /// given account since `since`.
    pub async fn preview(
        &self,
        realm: &str,
        account_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<EntryDiff>, EngineError> {
        let account_id = sanitize_entry_id(account_id)
            .ok_or_else(|| EngineError::Validation(format!("invalid account id: {account_id}")))?;
        let rules = self.active_rules(realm).await?;
        reconcile::preview(&self.ledger, &rules, account_id, since).await
    }

    /// Apply the active rule set to the approved entry ids and record the
    /// audit history. Partial success is the normal completion mode.
    pub async fn apply(&self, realm: &str, entry_ids: &[String]) -> Result<ApplyOutcome, EngineError> {
        let rules = self.active_rules(realm).await?;
        apply_batch(&self.ledger, &self.db, realm, &rules, entry_ids).await
    }

    /// Dry-run a pattern that is not (yet) a stored rule against recent
    /// lines on the source account.
    pub async fn test_pattern(
        &self,
        pattern: &str,
        is_regex: bool,
        from_account_id: &str,
        since: NaiveDate,
    ) -> Result<PatternTestReport, EngineError> {
        if pattern.trim().is_empty() {
            return Err(EngineError::Validation("pattern is required".to_string()));
        }
        let from_account_id = sanitize_entry_id(from_account_id).ok_or_else(|| {
            EngineError::Validation(format!("invalid account id: {from_account_id}"))
        })?;
        let probe = PatternProbe::new(pattern, is_regex)
            .map_err(|e| EngineError::InvalidPattern(e.to_string()))?;

        let entries = self.ledger.list_entries(since).await?;
        let mut matches = Vec::new();
        for entry in &entries {
            for line in entry.lines.iter().filter(|l| l.account.id == from_account_id) {
                let Some(description) = line.description.as_deref() else {
                    continue;
                };
                if let Some((match_start, match_end)) = probe.find(description) {
                    matches.push(PatternMatch {
                        entry_id: entry.id.clone(),
                        entry_date: entry.date,
                        description: description.to_string(),
                        match_start,
                        match_end,
                        amount: line.amount,
                        posting_type: line.posting_type,
                    });
                }
            }
        }

        let total_matches = matches.len();
        matches.truncate(PATTERN_TEST_CAP);
        Ok(PatternTestReport {
            truncated: total_matches > PATTERN_TEST_CAP,
            total_matches,
            matches,
        })
    }

    // ── History ──────────────────────────────────────────────────────────

    pub async fn list_history(
        &self,
        realm: &str,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<(Vec<HistoryEntry>, i64), EngineError> {
        Ok(storage::list_history(&self.db, realm, filter, page).await?)
    }

    pub async fn history_stats(&self, realm: &str) -> Result<HistoryStats, EngineError> {
        Ok(storage::history_stats(&self.db, realm).await?)
    }

    // ── Import / export ──────────────────────────────────────────────────

    /// Portable dump of a realm's rules in evaluation order, without
    /// internal ids or scope.
    pub async fn export_rules(&self, realm: &str) -> Result<Vec<RuleExport>, EngineError> {
        let rules = storage::list_rules(&self.db, realm, false).await?;
        Ok(rules.iter().map(RuleExport::from).collect())
    }

    /// Bulk import with per-item create validation. Bad items are counted
    /// and reported (up to a cap), not fatal; database failures abort.
    pub async fn import_rules(
        &self,
        realm: &str,
        items: Vec<RuleExport>,
    ) -> Result<ImportReport, EngineError> {
        let mut report = ImportReport::default();
        for (index, item) in items.into_iter().enumerate() {
            match storage::create_rule(&self.db, realm, item.into()).await {
                Ok(_) => report.imported += 1,
                Err(
                    e @ (StoreError::Validation(_)
                    | StoreError::InvalidPattern(_)
                    | StoreError::DuplicateRule),
                ) => {
                    report.skipped += 1;
                    if report.errors.len() < IMPORT_ERROR_CAP {
                        report.errors.push(format!("item {index}: {e}"));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            "rule import complete"
        );
        Ok(report)
    }

    async fn active_rules(&self, realm: &str) -> Result<RuleSet, EngineError> {
        Ok(RuleSet::new(storage::list_rules(&self.db, realm, true).await?))
    }
}
