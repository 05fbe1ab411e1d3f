use chrono::{DateTime, Duration, Utc};

use crate::models::performance::{PerformanceSeries, Timeframe};
use crate::models::portfolio::{HistoryPoint, Portfolio};

/// Performance-history policy: snapshot appends, retention pruning and
/// timeframe queries.
///
/// The sync path and the daily cleanup job share this one implementation,
/// so both prune at exactly the same cutoff.
#[derive(Debug, Clone, Copy)]
pub struct HistoryService {
    retention: Duration,
}

impl HistoryService {
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Oldest timestamp that survives pruning at `now`.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Drop points older than the retention window. Returns how many were removed.
    pub fn prune(&self, history: &mut Vec<HistoryPoint>, now: DateTime<Utc>) -> usize {
        let cutoff = self.retention_cutoff(now);
        let before = history.len();
        history.retain(|p| p.timestamp >= cutoff);
        before - history.len()
    }

    /// Append a `(now, total_value)` point when the portfolio is worth
    /// something, then prune. Returns whether a point was appended.
    pub fn record_snapshot(&self, portfolio: &mut Portfolio, now: DateTime<Utc>) -> bool {
        let appended = portfolio.total_value > 0.0;
        if appended {
            portfolio.performance_history.push(HistoryPoint {
                timestamp: now,
                total_value: portfolio.total_value,
            });
        }
        self.prune(&mut portfolio.performance_history, now);
        appended
    }

    /// Points at or after the timeframe's cutoff, chronologically, as
    /// parallel label/value sequences.
    pub fn series(
        &self,
        history: &[HistoryPoint],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> PerformanceSeries {
        let cutoff = timeframe.cutoff(now);
        let mut points: Vec<&HistoryPoint> =
            history.iter().filter(|p| p.timestamp >= cutoff).collect();
        points.sort_by_key(|p| p.timestamp);

        PerformanceSeries {
            labels: points.iter().map(|p| p.timestamp).collect(),
            values: points.iter().map(|p| p.total_value).collect(),
        }
    }
}

impl Default for HistoryService {
    fn default() -> Self {
        Self::new(Duration::days(365))
    }
}
