use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Window selector for the performance chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "24H")]
    Day,
    #[serde(rename = "1W")]
    Week,
    #[serde(rename = "1M")]
    Month,
    #[serde(rename = "3M")]
    Quarter,
    #[serde(rename = "6M")]
    HalfYear,
    #[serde(rename = "1Y")]
    Year,
    All,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Quarter,
        Timeframe::HalfYear,
        Timeframe::Year,
        Timeframe::All,
    ];

    /// Earliest timestamp included in this window, relative to `now`.
    /// Calendar-month windows follow the calendar (clamped at month end).
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months_back = |m: u32| {
            now.checked_sub_months(Months::new(m))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        };
        match self {
            Timeframe::Day => now - Duration::hours(24),
            Timeframe::Week => now - Duration::days(7),
            Timeframe::Month => months_back(1),
            Timeframe::Quarter => months_back(3),
            Timeframe::HalfYear => months_back(6),
            Timeframe::Year => months_back(12),
            Timeframe::All => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "24H",
            Timeframe::Week => "1W",
            Timeframe::Month => "1M",
            Timeframe::Quarter => "3M",
            Timeframe::HalfYear => "6M",
            Timeframe::Year => "1Y",
            Timeframe::All => "All",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .find(|tf| tf.as_str() == s)
            .copied()
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Unknown timeframe '{s}' (expected one of 24H, 1W, 1M, 3M, 6M, 1Y, All)"
                ))
            })
    }
}

/// Chart-ready history: parallel label/value sequences in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSeries {
    pub labels: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl PerformanceSeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
