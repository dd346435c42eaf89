use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reclass_core::{AccountInfo, Entry};

use crate::{LedgerApi, LedgerError};

/// Time-based account-metadata cache around any [`LedgerApi`]. Entries are
/// valid for a fixed TTL after insertion and are only refreshed on the
/// next lookup after expiry; there is no proactive invalidation, so an
/// account renamed upstream can stay stale for up to one TTL window.
/// The map grows without bound (account spaces are small).
pub struct CachedAccounts<L> {
    inner: L,
    ttl: Duration,
    accounts: Mutex<HashMap<String, (AccountInfo, Instant)>>,
}

impl<L> CachedAccounts<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        CachedAccounts {
            inner,
            ttl,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn cached(&self, id: &str) -> Option<AccountInfo> {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(id)
            .filter(|(_, inserted)| inserted.elapsed() < self.ttl)
            .map(|(info, _)| info.clone())
    }

    fn store(&self, info: &AccountInfo) {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts.insert(info.id.clone(), (info.clone(), Instant::now()));
    }
}

impl<L: LedgerApi> LedgerApi for CachedAccounts<L> {
    async fn list_entries(&self, since: NaiveDate) -> Result<Vec<Entry>, LedgerError> {
        self.inner.list_entries(since).await
    }

    async fn get_entry(&self, id: &str) -> Result<Entry, LedgerError> {
        self.inner.get_entry(id).await
    }

    async fn save_entry(&self, entry: &Entry) -> Result<Entry, LedgerError> {
        self.inner.save_entry(entry).await
    }

    async fn get_account(&self, id: &str) -> Result<AccountInfo, LedgerError> {
        if let Some(hit) = self.cached(id) {
            tracing::debug!(account = id, "account cache hit");
            return Ok(hit);
        }

        tracing::debug!(account = id, "account cache miss");
        let info = self.inner.get_account(id).await?;
        self.store(&info);
        Ok(info)
    }

    async fn list_accounts(&self) -> Result<Vec<AccountInfo>, LedgerError> {
        self.inner.list_accounts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLedger {
        fetches: AtomicUsize,
    }

    impl CountingLedger {
        fn new() -> Self {
            CountingLedger {
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl LedgerApi for CountingLedger {
        async fn list_entries(&self, _since: NaiveDate) -> Result<Vec<Entry>, LedgerError> {
            Ok(vec![])
        }

        async fn get_entry(&self, id: &str) -> Result<Entry, LedgerError> {
            Err(LedgerError::EntryNotFound(id.to_string()))
        }

        async fn save_entry(&self, entry: &Entry) -> Result<Entry, LedgerError> {
            Ok(entry.clone())
        }

        async fn get_account(&self, id: &str) -> Result<AccountInfo, LedgerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(AccountInfo {
                id: id.to_string(),
                name: format!("Account {id}"),
                account_type: "Expense".to_string(),
                account_subtype: None,
                parent_id: None,
                is_sub_account: false,
                balance: Decimal::ZERO,
            })
        }

        async fn list_accounts(&self) -> Result<Vec<AccountInfo>, LedgerError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_is_served_from_cache() {
        let cached = CachedAccounts::new(CountingLedger::new(), Duration::from_secs(3600));

        cached.get_account("62").await.unwrap();
        cached.get_account("62").await.unwrap();

        assert_eq!(cached.inner().fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_forces_refetch() {
        let cached = CachedAccounts::new(CountingLedger::new(), Duration::ZERO);

        cached.get_account("62").await.unwrap();
        cached.get_account("62").await.unwrap();

        assert_eq!(cached.inner().fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_accounts_are_cached_independently() {
        let cached = CachedAccounts::new(CountingLedger::new(), Duration::from_secs(3600));

        cached.get_account("62").await.unwrap();
        cached.get_account("63").await.unwrap();
        cached.get_account("62").await.unwrap();

        assert_eq!(cached.inner().fetches.load(Ordering::SeqCst), 2);
    }
}
