use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::errors::CoreError;
use crate::models::price::{PriceMap, PriceQuote};

use super::http::check_status;
use super::traits::PriceOracle;

/// (symbol, CoinGecko id, display name)
///
/// Symbols missing here are never sent upstream and never priced.
const COINS: &[(&str, &str, &str)] = &[
    ("BTC", "bitcoin", "Bitcoin"),
    ("ETH", "ethereum", "Ethereum"),
    ("BNB", "binancecoin", "BNB"),
    ("SOL", "solana", "Solana"),
    ("USDT", "tether", "Tether"),
    ("USDC", "usd-coin", "USD Coin"),
    ("XRP", "ripple", "XRP"),
    ("ADA", "cardano", "Cardano"),
    ("DOGE", "dogecoin", "Dogecoin"),
    ("AVAX", "avalanche-2", "Avalanche"),
    ("SHIB", "shiba-inu", "Shiba Inu"),
    ("DOT", "polkadot", "Polkadot"),
    ("LINK", "chainlink", "Chainlink"),
    ("MATIC", "matic-network", "Polygon"),
    ("UNI", "uniswap", "Uniswap"),
    ("LTC", "litecoin", "Litecoin"),
    ("TRX", "tron", "TRON"),
    ("ATOM", "cosmos", "Cosmos"),
    ("XLM", "stellar", "Stellar"),
    ("VET", "vechain", "VeChain"),
    ("FIL", "filecoin", "Filecoin"),
    ("THETA", "theta-token", "Theta Token"),
    ("FTM", "fantom", "Fantom"),
    ("ALGO", "algorand", "Algorand"),
    ("XTZ", "tezos", "Tezos"),
    ("MANA", "decentraland", "Decentraland"),
    ("SAND", "the-sandbox", "The Sandbox"),
    ("AXS", "axie-infinity", "Axie Infinity"),
    ("AAVE", "aave", "Aave"),
    ("COMP", "compound-governance-token", "Compound"),
    ("SNX", "synthetix-network-token", "Synthetix"),
    ("CRV", "curve-dao-token", "Curve DAO Token"),
    ("MKR", "maker", "Maker"),
    ("NEAR", "near", "NEAR Protocol"),
    ("ETC", "ethereum-classic", "Ethereum Classic"),
    ("XMR", "monero", "Monero"),
    ("APE", "apecoin", "ApeCoin"),
    ("HBAR", "hedera", "Hedera"),
    ("QNT", "quant-network", "Quant"),
    ("CHZ", "chiliz", "Chiliz"),
    ("FLOW", "flow", "Flow"),
    ("OP", "optimism", "Optimism"),
    ("ARB", "arbitrum", "Arbitrum"),
    ("TON", "the-open-network", "Toncoin"),
    ("ICP", "internet-computer", "Internet Computer"),
    ("IMX", "immutable-x", "Immutable X"),
    ("APT", "aptos", "Aptos"),
    ("GRT", "the-graph", "The Graph"),
    ("ENS", "ethereum-name-service", "Ethereum Name Service"),
    ("PEPE", "pepe", "Pepe"),
    ("SUI", "sui", "Sui"),
    ("RNDR", "render-token", "Render Token"),
    ("RENDER", "render-token", "Render Token"),
    ("WLD", "worldcoin-wld", "Worldcoin"),
    ("SEI", "sei-network", "Sei"),
    ("JUP", "jupiter-exchange-solana", "Jupiter"),
    ("PYTH", "pyth-network", "Pyth Network"),
    ("BONK", "bonk", "Bonk"),
    ("MSOL", "msol", "Marinade Staked SOL"),
    ("JITOSOL", "jito-staked-sol", "Jito Staked SOL"),
    ("JUPSOL", "jupiter-staked-sol", "Jupiter Staked SOL"),
    ("WSOL", "wrapped-solana", "Wrapped SOL"),
    ("STRK", "starknet", "Starknet"),
    ("TAO", "bittensor", "Bittensor"),
    ("INJ", "injective-protocol", "Injective"),
    ("LDO", "lido-dao", "Lido DAO"),
    ("GMX", "gmx", "GMX"),
    ("PENDLE", "pendle", "Pendle"),
    ("SUSHI", "sushi", "SushiSwap"),
    ("1INCH", "1inch", "1inch"),
    ("YFI", "yearn-finance", "yearn.finance"),
    ("BAL", "balancer", "Balancer"),
    ("DAI", "dai", "Dai"),
    ("WBTC", "wrapped-bitcoin", "Wrapped Bitcoin"),
    ("WETH", "weth", "WETH"),
    ("PAXG", "pax-gold", "PAX Gold"),
    ("ZEC", "zcash", "Zcash"),
    ("DASH", "dash", "Dash"),
];

/// CoinGecko id for an internal ticker symbol.
pub fn coin_id(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_uppercase();
    COINS.iter().find(|(s, _, _)| *s == upper).map(|(_, id, _)| *id)
}

/// Human-readable name for an internal ticker symbol.
pub fn coin_name(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_uppercase();
    COINS.iter().find(|(s, _, _)| *s == upper).map(|(_, _, name)| *name)
}

/// CoinGecko `/simple/price` adapter.
///
/// - **Auth**: optional demo key sent as `x-cg-demo-api-key`.
/// - **Batching**: all requested symbols go out in one call.
/// - **Failure**: logged and degraded to an empty map.
pub struct CoinGeckoOracle {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoOracle {
    pub fn new(client: Client, config: &SyncConfig) -> Self {
        Self {
            client,
            base_url: config.coingecko_base_url.trim_end_matches('/').to_string(),
            api_key: config.coingecko_api_key.clone(),
        }
    }

    /// Raw upstream call; errors propagate. `ids` maps coin id → symbols
    /// (several symbols may share one id, e.g. RNDR/RENDER).
    async fn fetch(&self, ids: &HashMap<&'static str, Vec<String>>) -> Result<PriceMap, CoreError> {
        let mut id_list: Vec<&str> = ids.keys().copied().collect();
        id_list.sort_unstable();
        let joined = id_list.join(",");

        let url = format!("{}/simple/price", self.base_url);
        let mut req = self.client.get(&url).query(&[
            ("ids", joined.as_str()),
            ("vs_currencies", "usd"),
            ("include_24hr_change", "true"),
        ]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = check_status("CoinGecko", req.send().await?).await?;
        let body: HashMap<String, SimplePrice> = resp.json().await.map_err(|e| CoreError::Api {
            provider: "CoinGecko".into(),
            message: format!("Failed to parse price response: {e}"),
        })?;

        let mut prices = PriceMap::new();
        for (id, symbols) in ids {
            let Some(entry) = body.get(*id) else { continue };
            let Some(usd) = entry.usd.filter(|p| p.is_finite() && *p >= 0.0) else {
                continue;
            };
            let change = entry
                .usd_24h_change
                .filter(|c| c.is_finite())
                .unwrap_or(0.0);
            for symbol in symbols {
                prices.insert(symbol.clone(), PriceQuote::new(usd, change));
            }
        }
        Ok(prices)
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    async fn get_prices(&self, symbols: &HashSet<String>) -> PriceMap {
        let mut ids: HashMap<&'static str, Vec<String>> = HashMap::new();
        for symbol in symbols {
            let upper = symbol.to_uppercase();
            match coin_id(&upper) {
                Some(id) => ids.entry(id).or_default().push(upper),
                None => debug!(symbol = %upper, "No CoinGecko mapping, skipping"),
            }
        }
        if ids.is_empty() {
            return PriceMap::new();
        }

        match self.fetch(&ids).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(requested = ids.len(), error = %e, "Price fetch failed, continuing without prices");
                PriceMap::new()
            }
        }
    }

    fn asset_name(&self, symbol: &str) -> Option<String> {
        coin_name(symbol).map(str::to_string)
    }
}
