use serde::Deserialize;
use std::time::Duration;

/// Connection settings for one company's ledger API. Token acquisition
/// and refresh happen upstream; this layer only consumes a bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    pub realm_id: String,
    pub access_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after the first, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub account_cache_ttl_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl LedgerConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn account_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.account_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = LedgerConfig::from_toml(
            r#"
            base_url = "https://sandbox-quickbooks.api.intuit.com"
            realm_id = "9130350000"
            access_token = "test-token"
            "#,
        )
        .unwrap();

        assert_eq!(config.realm_id, "9130350000");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.account_cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(LedgerConfig::from_toml(r#"base_url = "https://x""#).is_err());
    }
}
