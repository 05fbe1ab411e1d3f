use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::models::asset::AssetBalance;

/// Literal API key that, paired with [`SENTINEL_API_SECRET`], routes an
/// exchange integration to the simulated source.
pub const SENTINEL_API_KEY: &str = "test-api-key";
pub const SENTINEL_API_SECRET: &str = "test-api-secret";

pub fn is_sentinel(api_key: &str, api_secret: &str) -> bool {
    api_key == SENTINEL_API_KEY && api_secret == SENTINEL_API_SECRET
}

const MEXC_STARTER: &[(&str, f64)] = &[("BTC", 0.05), ("ETH", 0.5), ("SOL", 10.0), ("USDT", 1000.0)];

const BINANCE_STARTER: &[(&str, f64)] = &[
    ("BTC", 0.1),
    ("ETH", 1.0),
    ("BNB", 5.0),
    ("USDT", 2000.0),
    ("ADA", 500.0),
];

const DEMO_STARTER: &[(&str, f64)] = &[
    ("BTC", 0.25),
    ("ETH", 2.0),
    ("SOL", 25.0),
    ("MATIC", 1000.0),
    ("LINK", 50.0),
    ("USDT", 5000.0),
    ("USDC", 2500.0),
];

/// Deterministic starter holdings for a provider name; unknown names get the demo set.
pub fn starter_balances(provider_name: &str) -> &'static [(&'static str, f64)] {
    match provider_name {
        "MEXC" => MEXC_STARTER,
        "Binance" => BINANCE_STARTER,
        _ => DEMO_STARTER,
    }
}

/// In-memory demo exchange.
///
/// Each `(user, provider)` pair gets its starter set materialised on first
/// access and keeps it for the life of the process. Nothing here is written
/// to the document store, so a restart resets every simulated account.
/// Prices are not simulated; valuation still goes through the live oracle.
#[derive(Debug, Default)]
pub struct SimulatedExchange {
    accounts: DashMap<(Uuid, String), Vec<(String, f64)>>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated holdings, positive amounts only.
    pub fn balances(&self, user_id: Uuid, provider_name: &str) -> Vec<AssetBalance> {
        let entry = self
            .accounts
            .entry((user_id, provider_name.to_string()))
            .or_insert_with(|| {
                debug!(%user_id, provider = provider_name, "Materialising simulated account");
                starter_balances(provider_name)
                    .iter()
                    .map(|(symbol, amount)| (symbol.to_string(), *amount))
                    .collect()
            });

        entry
            .iter()
            .filter(|(_, amount)| *amount > 0.0)
            .map(|(symbol, amount)| AssetBalance::new(symbol.as_str(), *amount))
            .collect()
    }

    /// Number of materialised accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Drop every simulated account, as a process restart would.
    pub fn reset(&self) {
        self.accounts.clear();
    }
}
