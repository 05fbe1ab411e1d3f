use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::AggregatedAsset;

/// One timestamped total-value point in the performance history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
}

/// A user's aggregated holdings, valuation totals and performance history.
///
/// Mutated only by the sync engine and the scheduled snapshot/cleanup jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub user_id: Uuid,

    /// Rebuilt wholesale on every successful sync
    pub assets: Vec<AggregatedAsset>,

    pub total_value: f64,
    /// Sum of every asset's pnl_24h
    pub total_change_24h: f64,
    pub total_change_percent_24h: f64,

    /// Chronological, append-only apart from retention pruning
    pub performance_history: Vec<HistoryPoint>,

    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped by the store on every save
    pub version: u64,
}

impl Portfolio {
    /// An empty portfolio, as created at user registration.
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            assets: Vec::new(),
            total_value: 0.0,
            total_change_24h: 0.0,
            total_change_percent_24h: 0.0,
            performance_history: Vec::new(),
            last_sync: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Recompute portfolio totals from the current asset list.
    ///
    /// `total_change_percent_24h` is the change relative to the value 24 hours
    /// ago; it is 0 whenever that base is not positive (empty portfolio).
    pub fn recompute_totals(&mut self) {
        self.total_value = self.assets.iter().map(|a| a.total_value).sum();
        self.total_change_24h = self.assets.iter().map(|a| a.pnl_24h).sum();

        let previous_total = self.total_value - self.total_change_24h;
        self.total_change_percent_24h = if self.total_value > 0.0 && previous_total > 0.0 {
            self.total_change_24h / previous_total * 100.0
        } else {
            0.0
        };
    }
}

/// Portfolio headline numbers, as served to the summary endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_change_24h: f64,
    pub total_change_percent_24h: f64,
    pub assets: Vec<AggregatedAsset>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl PortfolioSummary {
    /// Summary for a user who has never synced.
    pub fn empty() -> Self {
        Self {
            total_value: 0.0,
            total_change_24h: 0.0,
            total_change_percent_24h: 0.0,
            assets: Vec::new(),
            last_sync: None,
        }
    }
}

impl From<&Portfolio> for PortfolioSummary {
    fn from(p: &Portfolio) -> Self {
        Self {
            total_value: p.total_value,
            total_change_24h: p.total_change_24h,
            total_change_percent_24h: p.total_change_percent_24h,
            assets: p.assets.clone(),
            last_sync: p.last_sync,
        }
    }
}
