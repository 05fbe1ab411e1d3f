use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::integration::{Integration, IntegrationKind};
use crate::models::sync::TransactionSyncReport;
use crate::models::transaction::{SourceTransaction, Transaction};
use crate::providers::registry::SourceRegistry;
use crate::storage::store::DocumentStore;

/// Pulls recent wallet transactions and records the ones not seen before.
///
/// Identity is `(user_id, tx_hash, type, integration_id)`; re-running
/// ingestion over the same upstream data writes nothing new. Exchange
/// integrations have no transaction feed here, only balances.
pub struct TransactionService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<SourceRegistry>,
    fetch_limit: usize,
    source_timeout: Duration,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<SourceRegistry>,
        fetch_limit: usize,
        source_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            fetch_limit,
            source_timeout,
        }
    }

    /// Record a batch of source transactions for one integration.
    pub async fn ingest(
        &self,
        user_id: Uuid,
        integration: &Integration,
        transactions: Vec<SourceTransaction>,
    ) -> Result<TransactionSyncReport, CoreError> {
        let mut report = TransactionSyncReport::default();

        for source_tx in transactions {
            report.fetched += 1;
            if source_tx.asset.amount <= 0.0 || !source_tx.asset.amount.is_finite() {
                report.ignored += 1;
                continue;
            }

            let tx = Transaction::from_source(
                user_id,
                integration.id,
                &integration.provider_name,
                integration.kind,
                source_tx,
            );

            if self.store.transaction_exists(&tx.key()).await? {
                report.duplicates += 1;
                continue;
            }
            // A concurrent ingestion may have won the race since the check.
            if self.store.insert_transaction(&tx).await? {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }

        Ok(report)
    }

    /// Fetch and ingest the most recent transactions of one wallet integration.
    pub async fn sync_wallet_transactions(
        &self,
        user_id: Uuid,
        integration: &Integration,
    ) -> Result<TransactionSyncReport, CoreError> {
        if integration.kind != IntegrationKind::Wallet {
            return Err(CoreError::ValidationError(format!(
                "Transaction ingestion only covers wallets, {} is an exchange",
                integration.provider_name
            )));
        }
        let address = integration.wallet_address().ok_or_else(|| {
            CoreError::ValidationError(format!("Wallet integration {} has no address", integration.id))
        })?;
        let source = self
            .registry
            .get(integration.kind, &integration.provider_name)
            .ok_or_else(|| CoreError::UnsupportedProvider {
                kind: integration.kind.to_string(),
                provider: integration.provider_name.clone(),
            })?;

        if !source.supports_transactions() {
            debug!(provider = %integration.provider_name, "Source has no transaction feed");
            return Ok(TransactionSyncReport::default());
        }

        let transactions = tokio::time::timeout(
            self.source_timeout,
            source.get_recent_transactions(address, self.fetch_limit),
        )
        .await
        .map_err(|_| CoreError::Timeout {
            operation: format!("{} transaction fetch", integration.provider_name),
            seconds: self.source_timeout.as_secs(),
        })??;

        let report = self.ingest(user_id, integration, transactions).await?;
        debug!(
            %user_id,
            integration_id = %integration.id,
            fetched = report.fetched,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Wallet transactions ingested"
        );
        Ok(report)
    }

    /// Ingest for every active wallet of a user. One wallet failing does not
    /// stop the others.
    pub async fn sync_user_wallets(&self, user_id: Uuid) -> Result<TransactionSyncReport, CoreError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        let mut total = TransactionSyncReport::default();
        for integration in user
            .active_integrations()
            .filter(|i| i.kind == IntegrationKind::Wallet)
        {
            match self.sync_wallet_transactions(user_id, integration).await {
                Ok(report) => total += report,
                Err(e) => warn!(
                    %user_id,
                    integration_id = %integration.id,
                    provider = %integration.provider_name,
                    error = %e,
                    "Wallet transaction sync failed"
                ),
            }
        }

        if total.inserted > 0 {
            info!(%user_id, inserted = total.inserted, "New wallet transactions recorded");
        }
        Ok(total)
    }

    /// Newest first by event time.
    pub async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.store.recent_transactions(user_id, limit).await
    }
}
