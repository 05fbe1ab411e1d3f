pub mod config;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use config::SyncConfig;
use errors::CoreError;
use models::{
    asset::AssetAllocation,
    integration::{IntegrationKind, IntegrationView},
    performance::{PerformanceSeries, Timeframe},
    portfolio::{Portfolio, PortfolioSummary},
    sync::{CredentialCheck, SyncReport, TransactionSyncReport},
    transaction::Transaction,
    user::User,
};
use providers::{
    coingecko::CoinGeckoOracle, http::build_client, registry::SourceRegistry,
    traits::PriceOracle,
};
use services::{
    aggregation_service::AggregationService,
    history_service::HistoryService,
    integration_service::IntegrationService,
    locks::UserLocks,
    scheduler::{AutoSyncSummary, Scheduler, SchedulerHandle},
    transaction_service::TransactionService,
};
use storage::{encryption::CredentialVault, memory::MemoryStore, store::DocumentStore};

/// Main entry point for the portfolio sync core.
/// Wires the store, the balance sources, the price oracle and every service
/// together; this is the surface an HTTP layer calls.
#[must_use]
pub struct PortfolioTracker {
    config: SyncConfig,
    store: Arc<dyn DocumentStore>,
    /// Set when the store is the in-process one, which can be snapshotted
    memory: Option<Arc<MemoryStore>>,
    registry: Arc<SourceRegistry>,
    locks: Arc<UserLocks>,
    history: HistoryService,
    aggregation: Arc<AggregationService>,
    transactions: Arc<TransactionService>,
    integrations: IntegrationService,
    scheduler: Arc<Scheduler>,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("exchanges", &self.registry.supported(IntegrationKind::Exchange))
            .field("wallets", &self.registry.supported(IntegrationKind::Wallet))
            .field("in_memory_store", &self.memory.is_some())
            .field("retention_days", &self.history.retention().num_days())
            .finish()
    }
}

impl PortfolioTracker {
    /// Build a tracker with the built-in sources, the CoinGecko oracle and an
    /// empty in-process store.
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        Self::with_memory_store(config, Arc::new(MemoryStore::new()))
    }

    /// Like [`PortfolioTracker::new`], but restore the store from a snapshot file.
    pub fn load_from_file(config: SyncConfig, path: &str) -> Result<Self, CoreError> {
        let store = MemoryStore::load_from_file(path)?;
        Self::with_memory_store(config, Arc::new(store))
    }

    fn with_memory_store(config: SyncConfig, store: Arc<MemoryStore>) -> Result<Self, CoreError> {
        let client = build_client(config.http_timeout());
        let registry = SourceRegistry::new_with_defaults(client.clone(), &config);
        let oracle: Arc<dyn PriceOracle> = Arc::new(CoinGeckoOracle::new(client, &config));
        let document_store: Arc<dyn DocumentStore> = store.clone();
        Self::build(config, document_store, Some(store), registry, oracle)
    }

    /// Build a tracker from caller-supplied collaborators (a persistent store,
    /// a custom source set, a fake oracle).
    pub fn with_components(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        registry: SourceRegistry,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, CoreError> {
        Self::build(config, store, None, registry, oracle)
    }

    fn build(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        memory: Option<Arc<MemoryStore>>,
        registry: SourceRegistry,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let vault = Arc::new(CredentialVault::new(&config.encryption_key)?);
        let registry = Arc::new(registry);
        let locks = Arc::new(UserLocks::new());
        let history = HistoryService::new(config.retention());

        let aggregation = Arc::new(AggregationService::new(
            store.clone(),
            registry.clone(),
            oracle,
            vault.clone(),
            locks.clone(),
            history,
            config.source_timeout(),
        ));
        let transactions = Arc::new(TransactionService::new(
            store.clone(),
            registry.clone(),
            config.transaction_fetch_limit,
            config.source_timeout(),
        ));
        let integrations =
            IntegrationService::new(store.clone(), registry.clone(), vault, locks.clone());
        let scheduler = Arc::new(Scheduler::new(
            aggregation.clone(),
            transactions.clone(),
            store.clone(),
            locks.clone(),
            history,
            config.auto_sync_interval(),
            config.cleanup_hour_utc,
        ));

        Ok(Self {
            config,
            store,
            memory,
            registry,
            locks,
            history,
            aggregation,
            transactions,
            integrations,
            scheduler,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Register a user together with their empty portfolio.
    pub async fn create_user(&self, username: &str) -> Result<User, CoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CoreError::ValidationError("Username is required".into()));
        }
        let user = User::new(username);
        self.store.save_user(&user).await?;
        self.store.save_portfolio(&Portfolio::new(user.id)).await?;
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, CoreError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
    }

    /// Delete a user with their portfolio and transactions.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<bool, CoreError> {
        let deleted = {
            let _guard = self.locks.lock(user_id).await;
            self.store.delete_user(user_id).await?
        };
        self.locks.remove(user_id);
        Ok(deleted)
    }

    // ── Sync ────────────────────────────────────────────────────────

    /// Fetch every active integration, re-aggregate and revalue the portfolio.
    pub async fn sync_portfolio(&self, user_id: Uuid) -> Result<SyncReport, CoreError> {
        self.aggregation.sync_portfolio(user_id).await
    }

    /// Ingest recent transactions from every active wallet of a user.
    pub async fn sync_wallet_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<TransactionSyncReport, CoreError> {
        self.transactions.sync_user_wallets(user_id).await
    }

    // ── Integrations ────────────────────────────────────────────────

    pub async fn validate_credentials(
        &self,
        user_id: Uuid,
        provider: &str,
        api_key: &str,
        api_secret: &str,
    ) -> CredentialCheck {
        self.integrations
            .validate_credentials(user_id, provider, api_key, api_secret)
            .await
    }

    pub async fn add_exchange_integration(
        &self,
        user_id: Uuid,
        provider: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<IntegrationView, CoreError> {
        self.integrations
            .add_exchange_integration(user_id, provider, api_key, api_secret)
            .await
    }

    pub async fn add_wallet_integration(
        &self,
        user_id: Uuid,
        provider: &str,
        address: &str,
    ) -> Result<IntegrationView, CoreError> {
        self.integrations
            .add_wallet_integration(user_id, provider, address)
            .await
    }

    /// Returns how many recorded transactions went with the integration.
    pub async fn remove_integration(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
    ) -> Result<usize, CoreError> {
        self.integrations
            .remove_integration(user_id, integration_id)
            .await
    }

    pub async fn rename_integration(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
        display_name: Option<String>,
    ) -> Result<IntegrationView, CoreError> {
        self.integrations
            .rename_integration(user_id, integration_id, display_name)
            .await
    }

    pub async fn set_integration_active(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
        active: bool,
    ) -> Result<IntegrationView, CoreError> {
        self.integrations
            .set_integration_active(user_id, integration_id, active)
            .await
    }

    pub async fn list_integrations(&self, user_id: Uuid) -> Result<Vec<IntegrationView>, CoreError> {
        self.integrations.list_integrations(user_id).await
    }

    /// Provider names that can be linked for `kind`, in registration order.
    #[must_use]
    pub fn supported_providers(&self, kind: IntegrationKind) -> Vec<String> {
        self.registry.supported(kind)
    }

    // ── Portfolio reads ─────────────────────────────────────────────

    /// Totals and assets as of the last sync; all zero before the first one.
    pub async fn get_summary(&self, user_id: Uuid) -> Result<PortfolioSummary, CoreError> {
        Ok(self
            .store
            .get_portfolio(user_id)
            .await?
            .map(|p| PortfolioSummary::from(&p))
            .unwrap_or_else(PortfolioSummary::empty))
    }

    /// Every asset with its percentage share of the portfolio.
    pub async fn get_assets(&self, user_id: Uuid) -> Result<Vec<AssetAllocation>, CoreError> {
        let Some(portfolio) = self.store.get_portfolio(user_id).await? else {
            return Ok(Vec::new());
        };
        let divisor = if portfolio.total_value > 0.0 {
            portfolio.total_value
        } else {
            1.0
        };

        Ok(portfolio
            .assets
            .into_iter()
            .map(|asset| AssetAllocation {
                allocation: asset.total_value / divisor * 100.0,
                asset,
            })
            .collect())
    }

    pub async fn get_performance(
        &self,
        user_id: Uuid,
        timeframe: Timeframe,
    ) -> Result<PerformanceSeries, CoreError> {
        Ok(self
            .store
            .get_portfolio(user_id)
            .await?
            .map(|p| {
                self.history
                    .series(&p.performance_history, timeframe, Utc::now())
            })
            .unwrap_or_default())
    }

    /// Newest first by event time.
    pub async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.transactions.recent_transactions(user_id, limit).await
    }

    // ── Scheduled jobs ──────────────────────────────────────────────

    /// Start the background jobs on the current tokio runtime.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.scheduler).start()
    }

    pub async fn run_auto_sync(&self) -> Result<AutoSyncSummary, CoreError> {
        self.scheduler.run_auto_sync().await
    }

    pub async fn run_hourly_snapshot(&self) -> Result<usize, CoreError> {
        self.scheduler.run_hourly_snapshot().await
    }

    pub async fn run_history_cleanup(&self) -> Result<usize, CoreError> {
        self.scheduler.run_history_cleanup().await
    }

    // ── Snapshots ───────────────────────────────────────────────────

    fn memory_store(&self) -> Result<&MemoryStore, CoreError> {
        self.memory.as_deref().ok_or_else(|| {
            CoreError::ValidationError("Snapshots are only available for the in-process store".into())
        })
    }

    /// Serialise the whole in-process store.
    pub async fn save_to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.memory_store()?.save_to_bytes().await
    }

    /// Write the whole in-process store to disk.
    pub async fn save_to_file(&self, path: &str) -> Result<(), CoreError> {
        self.memory_store()?.save_to_file(path).await
    }
}
