use chrono::{DateTime, NaiveDateTime, Utc};
use reclass_core::{NewRule, Rule, RuleUpdate};

use crate::{DbPool, StoreError};

type RuleRow = (
    i64,            // id
    String,         // realm_id
    String,         // pattern
    i64,            // is_regex
    String,         // from_account_id
    Option<String>, // from_account_name
    String,         // to_account_id
    Option<String>, // to_account_name
    i64,            // is_active
    Option<String>, // category
    i64,            // sort_order
    Option<String>, // created_at
    Option<String>, // updated_at
);

const RULE_COLUMNS: &str = "id, realm_id, pattern, is_regex, from_account_id, from_account_name, \
     to_account_id, to_account_name, is_active, category, sort_order, created_at, updated_at";

fn row_to_rule(r: RuleRow) -> Rule {
    Rule {
        id: r.0,
        realm_id: r.1,
        pattern: r.2,
        is_regex: r.3 != 0,
        from_account_id: r.4,
        from_account_name: r.5,
        to_account_id: r.6,
        to_account_name: r.7,
        is_active: r.8 != 0,
        category: r.9,
        sort_order: r.10,
        created_at: r.11.as_deref().and_then(parse_ts),
        updated_at: r.12.as_deref().and_then(parse_ts),
    }
}

/// SQLite's datetime('now') format, interpreted as UTC.
pub(crate) fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn validate_pattern(pattern: &str, is_regex: bool) -> Result<(), StoreError> {
    if pattern.trim().is_empty() {
        return Err(StoreError::Validation("pattern"));
    }
    if is_regex {
        regex::Regex::new(pattern).map_err(|e| StoreError::InvalidPattern(e.to_string()))?;
    }
    Ok(())
}

/// All rules in a realm in evaluation order (ascending sort_order).
pub async fn list_rules(
    pool: &DbPool,
    realm: &str,
    active_only: bool,
) -> Result<Vec<Rule>, StoreError> {
    let sql = if active_only {
        format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE realm_id = ? AND is_active = 1 ORDER BY sort_order ASC"
        )
    } else {
        format!("SELECT {RULE_COLUMNS} FROM rules WHERE realm_id = ? ORDER BY sort_order ASC")
    };

    let rows = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(realm)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(row_to_rule).collect())
}

pub async fn get_rule(pool: &DbPool, id: i64) -> Result<Rule, StoreError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?");
    let row = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(row_to_rule).ok_or(StoreError::RuleNotFound(id))
}

/// Insert a new rule at the end of the realm's evaluation order.
/// Rejects missing fields, uncompilable regex patterns, and duplicates of
/// an active rule with the same (pattern, from_account) in the realm.
pub async fn create_rule(pool: &DbPool, realm: &str, new: NewRule) -> Result<Rule, StoreError> {
    validate_pattern(&new.pattern, new.is_regex)?;
    if new.from_account_id.trim().is_empty() {
        return Err(StoreError::Validation("from_account_id"));
    }
    if new.to_account_id.trim().is_empty() {
        return Err(StoreError::Validation("to_account_id"));
    }

    if check_duplicate(pool, realm, &new.pattern, &new.from_account_id, None).await? {
        return Err(StoreError::DuplicateRule);
    }

    let mut tx = pool.begin().await?;

    let (next_order,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(sort_order), 0) + 1 FROM rules WHERE realm_id = ?")
            .bind(realm)
            .fetch_one(&mut *tx)
            .await?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO rules (realm_id, pattern, is_regex, from_account_id, from_account_name,
                           to_account_id, to_account_name, is_active, category, sort_order)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(realm)
    .bind(&new.pattern)
    .bind(new.is_regex)
    .bind(&new.from_account_id)
    .bind(&new.from_account_name)
    .bind(&new.to_account_id)
    .bind(&new.to_account_name)
    .bind(new.is_active)
    .bind(normalize_category(new.category))
    .bind(next_order)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    get_rule(pool, id).await
}

/// Field-level partial update. Re-validates the pattern when it or the
/// regex flag changes. Duplicates are deliberately not re-checked on edit.
pub async fn update_rule(pool: &DbPool, id: i64, update: RuleUpdate) -> Result<Rule, StoreError> {
    let existing = get_rule(pool, id).await?;

    let pattern = update.pattern.unwrap_or(existing.pattern);
    let is_regex = update.is_regex.unwrap_or(existing.is_regex);
    validate_pattern(&pattern, is_regex)?;

    let category = match update.category {
        Some(c) => normalize_category(Some(c)),
        None => existing.category,
    };

    sqlx::query(
        r#"
        UPDATE rules
        SET pattern = ?, is_regex = ?, from_account_id = ?, from_account_name = ?,
            to_account_id = ?, to_account_name = ?, is_active = ?, category = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(&pattern)
    .bind(is_regex)
    .bind(update.from_account_id.unwrap_or(existing.from_account_id))
    .bind(update.from_account_name.or(existing.from_account_name))
    .bind(update.to_account_id.unwrap_or(existing.to_account_id))
    .bind(update.to_account_name.or(existing.to_account_name))
    .bind(update.is_active.unwrap_or(existing.is_active))
    .bind(category)
    .bind(id)
    .execute(pool)
    .await?;

    get_rule(pool, id).await
}

/// Remove a rule. History rows that referenced it keep their data with a
/// nulled rule link (FK ON DELETE SET NULL).
pub async fn delete_rule(pool: &DbPool, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM rules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::RuleNotFound(id));
    }
    Ok(())
}

pub async fn toggle_rule(pool: &DbPool, id: i64) -> Result<Rule, StoreError> {
    let result = sqlx::query(
        "UPDATE rules SET is_active = NOT is_active, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::RuleNotFound(id));
    }
    get_rule(pool, id).await
}

/// Rewrite sort_order as the positional index of each id in `ordered_ids`.
/// Ids not present in the realm are skipped. All positions commit together.
pub async fn reorder_rules(pool: &DbPool, realm: &str, ordered_ids: &[i64]) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    for (position, id) in ordered_ids.iter().enumerate() {
        sqlx::query(
            "UPDATE rules SET sort_order = ?, updated_at = datetime('now') WHERE id = ? AND realm_id = ?",
        )
        .bind(position as i64)
        .bind(id)
        .bind(realm)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Distinct non-empty categories in a realm, sorted.
pub async fn get_rule_categories(pool: &DbPool, realm: &str) -> Result<Vec<String>, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT category FROM rules
         WHERE realm_id = ? AND category IS NOT NULL AND category != ''
         ORDER BY category ASC",
    )
    .bind(realm)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// True if an active rule with the same (pattern, from_account) exists in
/// the realm, optionally ignoring one rule id (edit pre-checks).
pub async fn check_duplicate(
    pool: &DbPool,
    realm: &str,
    pattern: &str,
    from_account_id: &str,
    exclude_id: Option<i64>,
) -> Result<bool, StoreError> {
    let row: Option<(i64,)> = match exclude_id {
        Some(exclude) => {
            sqlx::query_as(
                "SELECT id FROM rules
                 WHERE realm_id = ? AND pattern = ? AND from_account_id = ? AND is_active = 1
                   AND id != ? LIMIT 1",
            )
            .bind(realm)
            .bind(pattern)
            .bind(from_account_id)
            .bind(exclude)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id FROM rules
                 WHERE realm_id = ? AND pattern = ? AND from_account_id = ? AND is_active = 1
                 LIMIT 1",
            )
            .bind(realm)
            .bind(pattern)
            .bind(from_account_id)
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(row.is_some())
}
