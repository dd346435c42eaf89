use chrono::NaiveDate;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use reclass_core::{
    sanitize_entry_id, AccountInfo, AccountRef, Entry, EntryLine, ExtraFields, PostingType,
};

use crate::{LedgerApi, LedgerConfig, LedgerError};

const MINOR_VERSION: &str = "65";
const MAX_RESULTS: usize = 1000;

/// HTTP implementation of [`LedgerApi`] against a QuickBooks-style REST
/// API. Reads are retried with linear backoff on transient failures
/// (timeouts, connect errors, 429, 5xx); saves are never blindly retried
/// because the sync token makes replays unsafe.
pub struct HttpLedger {
    http: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedger {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .build()?;
        Ok(HttpLedger { http, config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v3/company/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.realm_id,
            path
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LedgerError> {
        let url = self.url(path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = self
                .http
                .get(&url)
                .bearer_auth(&self.config.access_token)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[("minorversion", MINOR_VERSION)])
                .query(query)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    let body = resp.text().await.unwrap_or_default();
                    if retryable && attempt <= self.config.max_retries {
                        tracing::warn!(%url, %status, attempt, "transient ledger error, retrying");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(LedgerError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt <= self.config.max_retries => {
                    tracing::warn!(%url, error = %e, attempt, "ledger unreachable, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, LedgerError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("minorversion", MINOR_VERSION)])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(200 * u64::from(attempt))
}

impl LedgerApi for HttpLedger {
    async fn list_entries(&self, since: NaiveDate) -> Result<Vec<Entry>, LedgerError> {
        // `since` is a typed date, so the interpolation cannot carry
        // injected query syntax.
        let sql = format!(
            "select * from JournalEntry where TxnDate >= '{since}' MAXRESULTS {MAX_RESULTS}"
        );
        let envelope: EntryQueryEnvelope = self.get_json("query", &[("query", &sql)]).await?;
        envelope
            .query_response
            .entries
            .into_iter()
            .map(entry_from_wire)
            .collect()
    }

    async fn get_entry(&self, id: &str) -> Result<Entry, LedgerError> {
        let id = sanitize_entry_id(id).ok_or_else(|| LedgerError::InvalidEntryId(id.to_string()))?;
        let result: Result<EntryEnvelope, _> =
            self.get_json(&format!("journalentry/{id}"), &[]).await;
        match result {
            Ok(envelope) => entry_from_wire(envelope.entry),
            Err(LedgerError::Status { status: 404, .. }) => {
                Err(LedgerError::EntryNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn save_entry(&self, entry: &Entry) -> Result<Entry, LedgerError> {
        let envelope: EntryEnvelope = self
            .post_json("journalentry", &wire_from_entry(entry))
            .await?;
        entry_from_wire(envelope.entry)
    }

    async fn get_account(&self, id: &str) -> Result<AccountInfo, LedgerError> {
        let id =
            sanitize_entry_id(id).ok_or_else(|| LedgerError::InvalidAccountId(id.to_string()))?;
        let result: Result<AccountEnvelope, _> = self.get_json(&format!("account/{id}"), &[]).await;
        match result {
            Ok(envelope) => Ok(account_from_wire(envelope.account)),
            Err(LedgerError::Status { status: 404, .. }) => {
                Err(LedgerError::AccountNotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, LedgerError> {
        let sql = format!("select * from Account where Active = true MAXRESULTS {MAX_RESULTS}");
        let envelope: AccountQueryEnvelope = self.get_json("query", &[("query", &sql)]).await?;
        Ok(envelope
            .query_response
            .accounts
            .into_iter()
            .map(account_from_wire)
            .collect())
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────────
// The remote API's PascalCase JSON, converted exactly once into the
// normalized core types so the engine never probes optional fields.

#[derive(Debug, Deserialize)]
struct EntryQueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: EntryQueryBody,
}

#[derive(Debug, Default, Deserialize)]
struct EntryQueryBody {
    #[serde(rename = "JournalEntry", default)]
    entries: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct EntryEnvelope {
    #[serde(rename = "JournalEntry")]
    entry: WireEntry,
}

#[derive(Debug, Deserialize)]
struct AccountQueryEnvelope {
    #[serde(rename = "QueryResponse", default)]
    query_response: AccountQueryBody,
}

#[derive(Debug, Default, Deserialize)]
struct AccountQueryBody {
    #[serde(rename = "Account", default)]
    accounts: Vec<WireAccount>,
}

#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    #[serde(rename = "Account")]
    account: WireAccount,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "TxnDate")]
    txn_date: String,
    #[serde(rename = "SyncToken", default, skip_serializing_if = "Option::is_none")]
    sync_token: Option<String>,
    #[serde(rename = "Line", default)]
    lines: Vec<WireLine>,
    // Fields the model does not interpret (DocNumber, PrivateNote, ...)
    // are captured and echoed back so the full-update POST is not lossy.
    #[serde(flatten)]
    extra: ExtraFields,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireLine {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Amount", default)]
    amount: Option<Decimal>,
    #[serde(rename = "JournalEntryLineDetail")]
    detail: Option<WireLineDetail>,
    #[serde(flatten)]
    extra: ExtraFields,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireLineDetail {
    #[serde(rename = "PostingType")]
    posting_type: String,
    #[serde(rename = "AccountRef")]
    account_ref: WireRef,
    #[serde(flatten)]
    extra: ExtraFields,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRef {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "FullyQualifiedName", default)]
    fully_qualified_name: Option<String>,
    #[serde(rename = "AccountType", default)]
    account_type: Option<String>,
    #[serde(rename = "AccountSubType", default)]
    account_subtype: Option<String>,
    #[serde(rename = "ParentRef", default)]
    parent_ref: Option<WireRef>,
    #[serde(rename = "CurrentBalance", default)]
    current_balance: Option<Decimal>,
}

fn entry_from_wire(wire: WireEntry) -> Result<Entry, LedgerError> {
    let date = NaiveDate::parse_from_str(&wire.txn_date, "%Y-%m-%d")
        .map_err(|_| LedgerError::Decode(format!("bad TxnDate '{}'", wire.txn_date)))?;

    let mut lines = Vec::with_capacity(wire.lines.len());
    for line in wire.lines {
        let detail = line.detail.ok_or_else(|| {
            LedgerError::Decode(format!("entry {} line without detail", wire.id))
        })?;
        let posting_type = match detail.posting_type.as_str() {
            "Debit" => PostingType::Debit,
            "Credit" => PostingType::Credit,
            other => {
                return Err(LedgerError::Decode(format!(
                    "entry {} unknown posting type '{other}'",
                    wire.id
                )))
            }
        };
        lines.push(EntryLine {
            line_id: line.id,
            description: line.description,
            amount: line.amount.unwrap_or_default(),
            posting_type,
            account: AccountRef {
                id: detail.account_ref.value,
                name: detail.account_ref.name.unwrap_or_default(),
            },
            extra: line.extra,
            detail_extra: detail.extra,
        });
    }

    Ok(Entry {
        id: wire.id,
        date,
        lines,
        sync_token: wire.sync_token,
        extra: wire.extra,
    })
}

fn wire_from_entry(entry: &Entry) -> WireEntry {
    WireEntry {
        id: entry.id.clone(),
        txn_date: entry.date.to_string(),
        sync_token: entry.sync_token.clone(),
        lines: entry
            .lines
            .iter()
            .map(|line| WireLine {
                id: line.line_id.clone(),
                description: line.description.clone(),
                amount: Some(line.amount),
                detail: Some(WireLineDetail {
                    posting_type: line.posting_type.to_string(),
                    account_ref: WireRef {
                        value: line.account.id.clone(),
                        name: Some(line.account.name.clone()),
                    },
                    extra: line.detail_extra.clone(),
                }),
                extra: line.extra.clone(),
            })
            .collect(),
        extra: entry.extra.clone(),
    }
}

fn account_from_wire(wire: WireAccount) -> AccountInfo {
    AccountInfo {
        id: wire.id,
        name: wire.fully_qualified_name.unwrap_or(wire.name),
        account_type: wire.account_type.unwrap_or_default(),
        account_subtype: wire.account_subtype,
        is_sub_account: wire.parent_ref.is_some(),
        parent_id: wire.parent_ref.map(|p| p.value),
        balance: wire.current_balance.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_JSON: &str = r#"{
        "JournalEntry": {
            "Id": "147",
            "TxnDate": "2026-07-14",
            "SyncToken": "3",
            "DocNumber": "JE-147",
            "PrivateNote": "cloud spend",
            "Line": [
                {
                    "Id": "0",
                    "Description": "AMAZON WEB SERVICES INVOICE",
                    "Amount": 129.99,
                    "DetailType": "JournalEntryLineDetail",
                    "JournalEntryLineDetail": {
                        "PostingType": "Debit",
                        "AccountRef": { "value": "60", "name": "Misc Expense" }
                    }
                },
                {
                    "Id": "1",
                    "Amount": 129.99,
                    "JournalEntryLineDetail": {
                        "PostingType": "Credit",
                        "AccountRef": { "value": "35", "name": "Checking" }
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn decodes_entry_and_normalizes_lines() {
        let envelope: EntryEnvelope = serde_json::from_str(ENTRY_JSON).unwrap();
        let entry = entry_from_wire(envelope.entry).unwrap();

        assert_eq!(entry.id, "147");
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2026, 7, 14).unwrap());
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(
            entry.lines[0].description.as_deref(),
            Some("AMAZON WEB SERVICES INVOICE")
        );
        assert_eq!(entry.lines[0].posting_type, PostingType::Debit);
        assert_eq!(entry.lines[0].account.id, "60");
        // Second line has no description; normalization keeps it as None.
        assert!(entry.lines[1].description.is_none());
    }

    #[test]
    fn wire_round_trip_preserves_entry() {
        let envelope: EntryEnvelope = serde_json::from_str(ENTRY_JSON).unwrap();
        let entry = entry_from_wire(envelope.entry).unwrap();

        let back = entry_from_wire(wire_from_entry(&entry)).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.sync_token, entry.sync_token);
        assert_eq!(back.lines.len(), entry.lines.len());
        assert_eq!(back.lines[0].account, entry.lines[0].account);
    }

    #[test]
    fn save_payload_echoes_unmodeled_remote_fields() {
        let envelope: EntryEnvelope = serde_json::from_str(ENTRY_JSON).unwrap();
        let entry = entry_from_wire(envelope.entry).unwrap();

        let payload = serde_json::to_value(wire_from_entry(&entry)).unwrap();
        assert_eq!(payload["DocNumber"], "JE-147");
        assert_eq!(payload["PrivateNote"], "cloud spend");
        assert_eq!(payload["Line"][0]["DetailType"], "JournalEntryLineDetail");
    }

    #[test]
    fn rejects_entry_with_bad_date() {
        let wire = WireEntry {
            id: "1".to_string(),
            txn_date: "07/14/2026".to_string(),
            sync_token: None,
            lines: vec![],
            extra: ExtraFields::new(),
        };
        assert!(matches!(entry_from_wire(wire), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn decodes_account_preferring_qualified_name() {
        let json = r#"{
            "Account": {
                "Id": "62",
                "Name": "Cloud Hosting",
                "FullyQualifiedName": "Expenses:Cloud Hosting",
                "AccountType": "Expense",
                "AccountSubType": "OtherMiscellaneousServiceCost",
                "ParentRef": { "value": "50" },
                "CurrentBalance": 1042.50
            }
        }"#;
        let envelope: AccountEnvelope = serde_json::from_str(json).unwrap();
        let account = account_from_wire(envelope.account);

        assert_eq!(account.name, "Expenses:Cloud Hosting");
        assert!(account.is_sub_account);
        assert_eq!(account.parent_id.as_deref(), Some("50"));
    }

    #[test]
    fn empty_query_response_decodes_to_no_entries() {
        let envelope: EntryQueryEnvelope = serde_json::from_str(r#"{"QueryResponse": {}}"#).unwrap();
        assert!(envelope.query_response.entries.is_empty());
    }
}
