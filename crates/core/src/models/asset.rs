use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::integration::IntegrationKind;

/// One positive holding reported by a balance source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Ticker symbol, uppercased (e.g., "BTC", "USDC")
    pub symbol: String,

    pub amount: f64,

    /// Human-readable name when the source knows it
    pub name: Option<String>,
}

impl AssetBalance {
    pub fn new(symbol: impl Into<String>, amount: f64) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            amount,
            name: None,
        }
    }

    pub fn named(symbol: impl Into<String>, amount: f64, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            amount,
            name: Some(name.into()),
        }
    }
}

/// One integration's share of an aggregated symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContribution {
    pub provider_name: String,
    pub kind: IntegrationKind,
    pub amount: f64,
}

/// A symbol's holdings summed across every active, successfully-synced integration,
/// valued at the latest oracle price.
///
/// Rebuilt wholesale on every sync; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAsset {
    pub symbol: String,
    pub name: String,
    /// Sum of same-symbol balances (never negative)
    pub amount: f64,
    pub current_price: f64,
    /// amount × current_price
    pub total_value: f64,
    pub change_percent_24h: f64,
    /// Value gained or lost over the last 24 hours at the current amount
    pub pnl_24h: f64,
    /// Provider name of the first contributing integration
    pub source: String,
    pub source_type: IntegrationKind,
    /// Every integration that contributed, in integration-list order
    pub sources: Vec<SourceContribution>,
    pub last_updated: DateTime<Utc>,
}

/// An aggregated asset plus its share of the whole portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    #[serde(flatten)]
    pub asset: AggregatedAsset,
    /// This asset's value / total portfolio value × 100
    pub allocation: f64,
}

/// A symbol's merged amount across sources, before pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    /// First name any contributing source supplied
    pub name: Option<String>,
    pub amount: f64,
    /// Contributors in integration-list order; the first one is the primary source
    pub sources: Vec<SourceContribution>,
}
