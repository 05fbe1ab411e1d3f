use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::integration::IntegrationKind;

/// Direction or nature of a historical movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Received,
    Sent,
    Buy,
    Sell,
    Swap,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Received => write!(f, "Received"),
            TransactionType::Sent => write!(f, "Sent"),
            TransactionType::Buy => write!(f, "Buy"),
            TransactionType::Sell => write!(f, "Sell"),
            TransactionType::Swap => write!(f, "Swap"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
    Failed,
}

/// The asset moved by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAsset {
    /// Uppercased ticker
    pub symbol: String,
    pub name: String,
    pub amount: f64,
}

impl TransactionAsset {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, amount: f64) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            amount,
        }
    }
}

/// A transaction as reported by a wallet source, before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTransaction {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub asset: TransactionAsset,
    /// USD value at the time, when the source knows it
    pub value: f64,
    pub tx_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Sources that cannot tell leave this empty; ingestion defaults it to completed
    pub status: Option<TransactionStatus>,
}

/// Identity of a wallet-sourced transaction; re-ingestion must not duplicate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub user_id: Uuid,
    pub tx_hash: Option<String>,
    pub tx_type: TransactionType,
    pub integration_id: Uuid,
}

/// Immutable record of one historical movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub integration_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub asset: TransactionAsset,
    pub value: f64,
    /// Provider name of the owning integration
    pub source: String,
    pub source_type: IntegrationKind,
    pub tx_hash: Option<String>,
    pub fee: f64,
    pub status: TransactionStatus,
    /// When the movement happened
    pub timestamp: DateTime<Utc>,
    /// When it was ingested
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a new record for a transaction reported by a wallet integration.
    pub fn from_source(
        user_id: Uuid,
        integration_id: Uuid,
        provider_name: &str,
        source_type: IntegrationKind,
        tx: SourceTransaction,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            integration_id,
            tx_type: tx.tx_type,
            asset: tx.asset,
            value: tx.value,
            source: provider_name.to_string(),
            source_type,
            tx_hash: tx.tx_hash,
            fee: 0.0,
            status: tx.status.unwrap_or_default(),
            timestamp: tx.timestamp,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            user_id: self.user_id,
            tx_hash: self.tx_hash.clone(),
            tx_type: self.tx_type,
            integration_id: self.integration_id,
        }
    }
}
