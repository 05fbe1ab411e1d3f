use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::integration::IntegrationKind;

/// What happened to one integration during a portfolio sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrationOutcome {
    /// Balances were fetched; `balances` counts the positive ones merged
    Synced { balances: usize },
    /// The fetch failed and this integration contributed nothing
    Failed { error: String },
    /// Inactive integrations are not fetched
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSyncStatus {
    pub integration_id: Uuid,
    pub provider_name: String,
    pub kind: IntegrationKind,
    pub outcome: IntegrationOutcome,
}

/// Result of one `sync_portfolio` run.
///
/// Unlike a bare count, the per-integration statuses make a partial sync
/// distinguishable from a complete one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub assets_updated: usize,
    pub last_sync: DateTime<Utc>,
    pub total_value: f64,
    pub integrations: Vec<IntegrationSyncStatus>,
}

impl SyncReport {
    pub fn failed_count(&self) -> usize {
        self.integrations
            .iter()
            .filter(|s| matches!(s.outcome, IntegrationOutcome::Failed { .. }))
            .count()
    }

    /// True when at least one active integration failed.
    pub fn is_partial(&self) -> bool {
        self.failed_count() > 0
    }
}

/// Result of ingesting one wallet's recent transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSyncReport {
    pub fetched: usize,
    pub inserted: usize,
    /// Already recorded under the same (user, hash, type, integration)
    pub duplicates: usize,
    /// Zero-amount movements that are never recorded
    pub ignored: usize,
}

impl std::ops::AddAssign for TransactionSyncReport {
    fn add_assign(&mut self, rhs: Self) {
        self.fetched += rhs.fetched;
        self.inserted += rhs.inserted;
        self.duplicates += rhs.duplicates;
        self.ignored += rhs.ignored;
    }
}

/// Outcome of checking a set of exchange credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialCheck {
    Valid,
    /// The exchange rejected the keys (or the provider is unknown)
    Invalid(String),
    /// The check could not be completed; retrying later may succeed
    Unavailable(String),
}

impl CredentialCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, CredentialCheck::Valid)
    }
}
