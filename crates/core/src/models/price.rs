use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Spot price and 24h move for one asset, as reported by the price oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub usd_price: f64,
    /// Percentage change over the last 24 hours (e.g. 2.5 means +2.5%)
    pub change_24h_percent: f64,
}

impl PriceQuote {
    pub fn new(usd_price: f64, change_24h_percent: f64) -> Self {
        Self {
            usd_price,
            change_24h_percent,
        }
    }
}

/// Oracle result keyed by uppercase ticker symbol.
/// Symbols the oracle could not price are simply absent.
pub type PriceMap = HashMap<String, PriceQuote>;
