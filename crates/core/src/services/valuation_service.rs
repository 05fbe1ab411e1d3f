use chrono::{DateTime, Utc};

use crate::models::asset::{AggregatedAsset, Holding};
use crate::models::price::PriceMap;
use crate::providers::traits::PriceOracle;

/// Joins merged holdings with oracle prices.
///
/// Valuation per asset:
/// - `total_value = amount × price`
/// - `previous_value = total_value / (1 + change/100)`
/// - `pnl_24h = total_value − previous_value`
///
/// Symbols the oracle did not price are valued at 0 with 0% change.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Value 24 hours ago implied by the current value and the 24h change.
    ///
    /// A change of −100% or worse has no defined previous value; the current
    /// value is returned so the P&L comes out as 0.
    pub fn previous_value(&self, total_value: f64, change_percent_24h: f64) -> f64 {
        let factor = 1.0 + change_percent_24h / 100.0;
        if factor <= 0.0 || !factor.is_finite() {
            return total_value;
        }
        total_value / factor
    }

    pub fn pnl_24h(&self, total_value: f64, change_percent_24h: f64) -> f64 {
        total_value - self.previous_value(total_value, change_percent_24h)
    }

    /// Price every holding, keeping the holdings' order.
    pub fn value_holdings(
        &self,
        holdings: Vec<Holding>,
        prices: &PriceMap,
        oracle: &dyn PriceOracle,
        now: DateTime<Utc>,
    ) -> Vec<AggregatedAsset> {
        holdings
            .into_iter()
            .filter_map(|h| {
                // Every holding has at least one contributor; skip defensively otherwise.
                let primary = h.sources.first()?.clone();
                let (price, change) = prices
                    .get(&h.symbol)
                    .map_or((0.0, 0.0), |q| (q.usd_price, q.change_24h_percent));

                let total_value = h.amount * price;
                let name = h
                    .name
                    .or_else(|| oracle.asset_name(&h.symbol))
                    .unwrap_or_else(|| h.symbol.clone());

                Some(AggregatedAsset {
                    name,
                    amount: h.amount,
                    current_price: price,
                    total_value,
                    change_percent_24h: change,
                    pnl_24h: self.pnl_24h(total_value, change),
                    source: primary.provider_name,
                    source_type: primary.kind,
                    sources: h.sources,
                    last_updated: now,
                    symbol: h.symbol,
                })
            })
            .collect()
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}
