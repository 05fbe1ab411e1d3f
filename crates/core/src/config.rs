use std::env;
use std::time::Duration;

use crate::errors::CoreError;

const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_ETH_RPC_URL: &str = "https://eth.llamarpc.com";
const DEFAULT_ETHERSCAN_BASE_URL: &str = "https://api.etherscan.io/api";
const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Longest history window accepted (100 years).
pub const MAX_HISTORY_RETENTION_DAYS: i64 = 36_500;

/// Runtime configuration for the sync engine and its external collaborators.
///
/// Every upstream endpoint is configurable so tests and staging deployments
/// can point the clients at local fakes.
#[derive(Clone)]
pub struct SyncConfig {
    /// Process-wide secret the credential vault derives its key from.
    pub encryption_key: String,

    pub coingecko_api_key: Option<String>,
    pub coingecko_base_url: String,

    pub eth_rpc_url: String,
    pub etherscan_api_key: Option<String>,
    pub etherscan_base_url: String,

    pub solana_rpc_url: String,

    /// Per-request HTTP timeout applied to every outbound client.
    pub http_timeout_secs: u64,
    /// Upper bound on one integration's whole balance fetch (may span many requests).
    pub source_timeout_secs: u64,

    pub auto_sync_interval_secs: u64,
    /// Hour of day (UTC) the history cleanup job fires.
    pub cleanup_hour_utc: u32,
    pub history_retention_days: i64,
    pub transaction_fetch_limit: usize,

    pub explorer_retry_attempts: u32,
    pub explorer_retry_delay_ms: u64,
    pub explorer_page_size: u32,
    pub explorer_max_pages: u32,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("encryption_key", &"<redacted>")
            .field("coingecko_api_key", &self.coingecko_api_key.as_ref().map(|_| "<redacted>"))
            .field("coingecko_base_url", &self.coingecko_base_url)
            .field("eth_rpc_url", &self.eth_rpc_url)
            .field("etherscan_api_key", &self.etherscan_api_key.as_ref().map(|_| "<redacted>"))
            .field("etherscan_base_url", &self.etherscan_base_url)
            .field("solana_rpc_url", &self.solana_rpc_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("auto_sync_interval_secs", &self.auto_sync_interval_secs)
            .field("cleanup_hour_utc", &self.cleanup_hour_utc)
            .field("history_retention_days", &self.history_retention_days)
            .field("transaction_fetch_limit", &self.transaction_fetch_limit)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    /// Defaults for everything except the encryption secret.
    pub fn new(encryption_key: impl Into<String>) -> Self {
        Self {
            encryption_key: encryption_key.into(),
            coingecko_api_key: None,
            coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
            eth_rpc_url: DEFAULT_ETH_RPC_URL.to_string(),
            etherscan_api_key: None,
            etherscan_base_url: DEFAULT_ETHERSCAN_BASE_URL.to_string(),
            solana_rpc_url: DEFAULT_SOLANA_RPC_URL.to_string(),
            http_timeout_secs: 30,
            source_timeout_secs: 90,
            auto_sync_interval_secs: 15 * 60,
            cleanup_hour_utc: 2,
            history_retention_days: 365,
            transaction_fetch_limit: 20,
            explorer_retry_attempts: 3,
            explorer_retry_delay_ms: 1000,
            explorer_page_size: 1000,
            explorer_max_pages: 10,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `ENCRYPTION_KEY` is mandatory; there is deliberately no built-in fallback key.
    pub fn from_env() -> Result<Self, CoreError> {
        let encryption_key = env::var("ENCRYPTION_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CoreError::ValidationError("ENCRYPTION_KEY is not set".into()))?;

        let mut config = Self::new(encryption_key);

        config.coingecko_api_key = non_empty_var("COINGECKO_API_KEY");
        if let Some(url) = non_empty_var("COINGECKO_BASE_URL") {
            config.coingecko_base_url = url;
        }
        if let Some(url) = non_empty_var("ETH_RPC_URL") {
            config.eth_rpc_url = url;
        }
        config.etherscan_api_key = non_empty_var("ETHERSCAN_API_KEY");
        if let Some(url) = non_empty_var("ETHERSCAN_BASE_URL") {
            config.etherscan_base_url = url;
        }
        if let Some(url) = non_empty_var("SOLANA_RPC_URL") {
            config.solana_rpc_url = url;
        }

        config.http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", config.http_timeout_secs)?;
        config.source_timeout_secs = parse_var("SOURCE_TIMEOUT_SECS", config.source_timeout_secs)?;
        config.auto_sync_interval_secs =
            parse_var("AUTO_SYNC_INTERVAL_SECS", config.auto_sync_interval_secs)?;
        config.cleanup_hour_utc = parse_var("CLEANUP_HOUR_UTC", config.cleanup_hour_utc)?;
        config.history_retention_days =
            parse_var("HISTORY_RETENTION_DAYS", config.history_retention_days)?;
        config.transaction_fetch_limit =
            parse_var("TRANSACTION_FETCH_LIMIT", config.transaction_fetch_limit)?;
        config.explorer_retry_attempts =
            parse_var("EXPLORER_RETRY_ATTEMPTS", config.explorer_retry_attempts)?;
        config.explorer_retry_delay_ms =
            parse_var("EXPLORER_RETRY_DELAY_MS", config.explorer_retry_delay_ms)?;
        config.explorer_page_size = parse_var("EXPLORER_PAGE_SIZE", config.explorer_page_size)?;
        config.explorer_max_pages = parse_var("EXPLORER_MAX_PAGES", config.explorer_max_pages)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the scheduler or the retention policy misbehave.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cleanup_hour_utc > 23 {
            return Err(CoreError::ValidationError(format!(
                "CLEANUP_HOUR_UTC must be 0..=23, got {}",
                self.cleanup_hour_utc
            )));
        }
        if self.auto_sync_interval_secs == 0 {
            return Err(CoreError::ValidationError(
                "AUTO_SYNC_INTERVAL_SECS must be positive".into(),
            ));
        }
        if !(1..=MAX_HISTORY_RETENTION_DAYS).contains(&self.history_retention_days) {
            return Err(CoreError::ValidationError(format!(
                "HISTORY_RETENTION_DAYS must be 1..={MAX_HISTORY_RETENTION_DAYS}, got {}",
                self.history_retention_days
            )));
        }
        if self.http_timeout_secs == 0 || self.source_timeout_secs == 0 {
            return Err(CoreError::ValidationError(
                "timeouts must be positive".into(),
            ));
        }
        if self.explorer_page_size == 0 {
            return Err(CoreError::ValidationError(
                "EXPLORER_PAGE_SIZE must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(
            self.history_retention_days
                .clamp(1, MAX_HISTORY_RETENTION_DAYS),
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CoreError>
where
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            CoreError::ValidationError(format!("{name} has an invalid value '{raw}': {e}"))
        }),
        None => Ok(default),
    }
}
