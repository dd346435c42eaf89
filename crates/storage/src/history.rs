use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::str::FromStr;

use reclass_core::AccountRef;

use crate::rules::parse_ts;
use crate::{DbPool, StoreError};

/// Payload for one audit record: a single line change applied upstream.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub realm_id: String,
    pub entry_id: String,
    pub entry_date: Option<NaiveDate>,
    pub line_description: Option<String>,
    pub from_account: AccountRef,
    pub to_account: AccountRef,
    pub amount: Option<Decimal>,
    pub rule_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub realm_id: String,
    pub entry_id: String,
    pub entry_date: Option<NaiveDate>,
    pub line_description: Option<String>,
    pub from_account_id: Option<String>,
    pub from_account_name: Option<String>,
    pub to_account_id: Option<String>,
    pub to_account_name: Option<String>,
    pub amount: Option<Decimal>,
    /// Originating rule; null once that rule has been deleted.
    pub rule_id: Option<i64>,
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub entry_id: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Page { page: 1, per_page: 25 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountCount {
    pub account: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total: i64,
    pub this_month: i64,
    pub top_accounts: Vec<AccountCount>,
    pub daily: Vec<DailyCount>,
}

/// Insert one record on the caller's connection. The caller controls the
/// transaction boundary so a whole apply batch commits at once.
pub async fn log_history(
    conn: &mut SqliteConnection,
    record: &HistoryRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO history (realm_id, entry_id, entry_date, line_description,
                             from_account_id, from_account_name,
                             to_account_id, to_account_name, amount, rule_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.realm_id)
    .bind(&record.entry_id)
    .bind(record.entry_date.map(|d| d.to_string()))
    .bind(&record.line_description)
    .bind(&record.from_account.id)
    .bind(&record.from_account.name)
    .bind(&record.to_account.id)
    .bind(&record.to_account.name)
    .bind(record.amount.map(|a| a.to_string()))
    .bind(record.rule_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Commit a batch of records in one transaction.
pub async fn log_history_batch(pool: &DbPool, records: &[HistoryRecord]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for record in records {
        log_history(&mut *tx, record).await?;
    }
    tx.commit().await?;

    Ok(())
}

type HistoryRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
);

fn row_to_entry(r: HistoryRow) -> HistoryEntry {
    HistoryEntry {
        id: r.0,
        realm_id: r.1,
        entry_id: r.2,
        entry_date: r.3.as_deref().and_then(|s| NaiveDate::from_str(s).ok()),
        line_description: r.4,
        from_account_id: r.5,
        from_account_name: r.6,
        to_account_id: r.7,
        to_account_name: r.8,
        amount: r.9.as_deref().and_then(|s| Decimal::from_str(s).ok()),
        rule_id: r.10,
        applied_at: r.11.as_deref().and_then(parse_ts),
    }
}

/// Newest-first page of history for a realm, with the unpaged total.
pub async fn list_history(
    pool: &DbPool,
    realm: &str,
    filter: &HistoryFilter,
    page: Page,
) -> Result<(Vec<HistoryEntry>, i64), StoreError> {
    let mut where_clause = String::from("WHERE realm_id = ?");
    if filter.entry_id.is_some() {
        where_clause.push_str(" AND entry_id = ?");
    }
    if filter.from_date.is_some() {
        where_clause.push_str(" AND entry_date >= ?");
    }
    if filter.to_date.is_some() {
        where_clause.push_str(" AND entry_date <= ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM history {where_clause}");
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql).bind(realm);
    if let Some(entry_id) = &filter.entry_id {
        count_query = count_query.bind(entry_id);
    }
    if let Some(from) = filter.from_date {
        count_query = count_query.bind(from.to_string());
    }
    if let Some(to) = filter.to_date {
        count_query = count_query.bind(to.to_string());
    }
    let (total,) = count_query.fetch_one(pool).await?;

    // Widen before multiplying; a large page number must fall off the end
    // of the data, not overflow u32.
    let per_page = i64::from(page.per_page.max(1));
    let offset = (i64::from(page.page.max(1)) - 1) * per_page;

    let list_sql = format!(
        "SELECT id, realm_id, entry_id, entry_date, line_description,
                from_account_id, from_account_name, to_account_id, to_account_name,
                amount, rule_id, applied_at
         FROM history {where_clause}
         ORDER BY applied_at DESC, id DESC
         LIMIT ? OFFSET ?"
    );
    let mut list_query = sqlx::query_as::<_, HistoryRow>(&list_sql).bind(realm);
    if let Some(entry_id) = &filter.entry_id {
        list_query = list_query.bind(entry_id);
    }
    if let Some(from) = filter.from_date {
        list_query = list_query.bind(from.to_string());
    }
    if let Some(to) = filter.to_date {
        list_query = list_query.bind(to.to_string());
    }
    let rows = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((rows.into_iter().map(row_to_entry).collect(), total))
}

/// Dashboard aggregates: lifetime total, current calendar month, top five
/// destination accounts, and per-day counts over the last seven days.
pub async fn history_stats(pool: &DbPool, realm: &str) -> Result<HistoryStats, StoreError> {
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM history WHERE realm_id = ?")
        .bind(realm)
        .fetch_one(pool)
        .await?;

    let (this_month,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM history
         WHERE realm_id = ? AND applied_at >= datetime('now', 'start of month')",
    )
    .bind(realm)
    .fetch_one(pool)
    .await?;

    let top_rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT to_account_name, COUNT(*) AS n FROM history
         WHERE realm_id = ? AND to_account_name IS NOT NULL AND to_account_name != ''
         GROUP BY to_account_name
         ORDER BY n DESC
         LIMIT 5",
    )
    .bind(realm)
    .fetch_all(pool)
    .await?;

    let daily_rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT date(applied_at) AS d, COUNT(*) FROM history
         WHERE realm_id = ? AND applied_at >= datetime('now', '-7 days')
         GROUP BY d
         ORDER BY d ASC",
    )
    .bind(realm)
    .fetch_all(pool)
    .await?;

    Ok(HistoryStats {
        total,
        this_month,
        top_accounts: top_rows
            .into_iter()
            .map(|(account, count)| AccountCount { account, count })
            .collect(),
        daily: daily_rows
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_db_in_memory, create_rule, delete_rule};
    use reclass_core::NewRule;

    const REALM: &str = "9130350000";

    fn record(entry_id: &str, to_name: &str, rule_id: Option<i64>) -> HistoryRecord {
        HistoryRecord {
            realm_id: REALM.to_string(),
            entry_id: entry_id.to_string(),
            entry_date: NaiveDate::from_ymd_opt(2026, 8, 3),
            line_description: Some("AMAZON WEB SERVICES INVOICE".to_string()),
            from_account: AccountRef::new("60", "Misc Expense"),
            to_account: AccountRef::new("62", to_name),
            amount: Some(Decimal::new(12999, 2)),
            rule_id,
        }
    }

    #[tokio::test]
    async fn batch_log_and_paged_list() {
        let pool = create_db_in_memory().await.unwrap();
        let records: Vec<HistoryRecord> = (0..7).map(|i| record(&i.to_string(), "Cloud Hosting", None)).collect();
        log_history_batch(&pool, &records).await.unwrap();

        let (page1, total) = list_history(
            &pool,
            REALM,
            &HistoryFilter::default(),
            Page { page: 1, per_page: 5 },
        )
        .await
        .unwrap();
        assert_eq!(total, 7);
        assert_eq!(page1.len(), 5);
        // Newest first: the last inserted row leads.
        assert_eq!(page1[0].entry_id, "6");

        let (page2, _) = list_history(
            &pool,
            REALM,
            &HistoryFilter::default(),
            Page { page: 2, per_page: 5 },
        )
        .await
        .unwrap();
        assert_eq!(page2.len(), 2);
    }

    #[tokio::test]
    async fn out_of_range_page_returns_empty_not_panic() {
        let pool = create_db_in_memory().await.unwrap();
        log_history_batch(&pool, &[record("1", "Cloud Hosting", None)])
            .await
            .unwrap();

        let (rows, total) = list_history(
            &pool,
            REALM,
            &HistoryFilter::default(),
            Page { page: u32::MAX, per_page: 100 },
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_entry_and_date_range() {
        let pool = create_db_in_memory().await.unwrap();
        let mut early = record("100", "Cloud Hosting", None);
        early.entry_date = NaiveDate::from_ymd_opt(2026, 7, 1);
        let late = record("200", "Cloud Hosting", None);
        log_history_batch(&pool, &[early, late]).await.unwrap();

        let (by_entry, total) = list_history(
            &pool,
            REALM,
            &HistoryFilter {
                entry_id: Some("100".to_string()),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(by_entry[0].entry_id, "100");

        let (in_august, _) = list_history(
            &pool,
            REALM,
            &HistoryFilter {
                from_date: NaiveDate::from_ymd_opt(2026, 8, 1),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
        assert_eq!(in_august.len(), 1);
        assert_eq!(in_august[0].entry_id, "200");
    }

    #[tokio::test]
    async fn history_is_scoped_per_realm() {
        let pool = create_db_in_memory().await.unwrap();
        let mut other = record("1", "Cloud Hosting", None);
        other.realm_id = "other-realm".to_string();
        log_history_batch(&pool, &[record("1", "Cloud Hosting", None), other])
            .await
            .unwrap();

        let (_, total) = list_history(&pool, REALM, &HistoryFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn deleting_rule_nulls_history_link_but_keeps_row() {
        let pool = create_db_in_memory().await.unwrap();
        let rule = create_rule(
            &pool,
            REALM,
            NewRule {
                pattern: "AMAZON".to_string(),
                is_regex: false,
                from_account_id: "60".to_string(),
                from_account_name: None,
                to_account_id: "62".to_string(),
                to_account_name: None,
                is_active: true,
                category: None,
            },
        )
        .await
        .unwrap();

        log_history_batch(&pool, &[record("1", "Cloud Hosting", Some(rule.id))])
            .await
            .unwrap();
        delete_rule(&pool, rule.id).await.unwrap();

        let (entries, total) = list_history(&pool, REALM, &HistoryFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(entries[0].rule_id.is_none());
        assert_eq!(entries[0].to_account_name.as_deref(), Some("Cloud Hosting"));
    }

    #[tokio::test]
    async fn stats_aggregate_totals_and_top_accounts() {
        let pool = create_db_in_memory().await.unwrap();
        let mut records = Vec::new();
        for i in 0..3 {
            records.push(record(&i.to_string(), "Cloud Hosting", None));
        }
        records.push(record("9", "Travel", None));
        log_history_batch(&pool, &records).await.unwrap();

        let stats = history_stats(&pool, REALM).await.unwrap();
        assert_eq!(stats.total, 4);
        // Rows are stamped with the current time, so they all fall inside
        // the current month and the 7-day window.
        assert_eq!(stats.this_month, 4);
        assert_eq!(stats.top_accounts[0].account, "Cloud Hosting");
        assert_eq!(stats.top_accounts[0].count, 3);
        assert_eq!(stats.daily.len(), 1);
        assert_eq!(stats.daily[0].count, 4);
    }
}
