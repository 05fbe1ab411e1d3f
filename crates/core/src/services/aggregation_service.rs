use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::asset::{AssetBalance, Holding, SourceContribution};
use crate::models::integration::{Integration, IntegrationKind, IntegrationTarget};
use crate::models::portfolio::Portfolio;
use crate::models::sync::{IntegrationOutcome, IntegrationSyncStatus, SyncReport};
use crate::providers::registry::SourceRegistry;
use crate::providers::traits::{BalanceRequest, PriceOracle};
use crate::storage::encryption::CredentialVault;
use crate::storage::store::DocumentStore;
use crate::services::history_service::HistoryService;
use crate::services::locks::UserLocks;
use crate::services::valuation_service::ValuationService;

/// Balances one integration reported, tagged with where they came from.
#[derive(Debug, Clone)]
pub struct SourceBalances {
    pub provider_name: String,
    pub kind: IntegrationKind,
    pub balances: Vec<AssetBalance>,
}

/// Merge per-source balances into one holding per symbol.
///
/// Input order is integration-list order and is preserved twice over: holdings
/// appear in first-encounter order, and each holding's contributors keep the
/// order in which they were added. Non-positive amounts are ignored.
pub fn merge_balances(sources: &[SourceBalances]) -> Vec<Holding> {
    let mut holdings: Vec<Holding> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for source in sources {
        for balance in &source.balances {
            if balance.amount <= 0.0 || !balance.amount.is_finite() {
                continue;
            }
            let symbol = balance.symbol.to_uppercase();
            let idx = *index.entry(symbol.clone()).or_insert_with(|| {
                holdings.push(Holding {
                    symbol,
                    name: None,
                    amount: 0.0,
                    sources: Vec::new(),
                });
                holdings.len() - 1
            });

            let holding = &mut holdings[idx];
            holding.amount += balance.amount;
            if holding.name.is_none() {
                holding.name = balance.name.clone().filter(|n| !n.trim().is_empty());
            }
            holding.sources.push(SourceContribution {
                provider_name: source.provider_name.clone(),
                kind: source.kind,
                amount: balance.amount,
            });
        }
    }

    holdings
}

/// The portfolio sync engine.
///
/// For one user: fetch balances from every active integration concurrently
/// (each bounded by the source timeout, failures isolated per integration),
/// merge them by symbol, price them with one oracle call, rebuild the asset
/// list wholesale, record a history point and persist once.
///
/// Nothing is written until every fetch has finished, so a crash mid-sync
/// leaves the previous portfolio in place.
pub struct AggregationService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<SourceRegistry>,
    oracle: Arc<dyn PriceOracle>,
    vault: Arc<CredentialVault>,
    locks: Arc<UserLocks>,
    history: HistoryService,
    valuation: ValuationService,
    source_timeout: Duration,
}

impl AggregationService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<SourceRegistry>,
        oracle: Arc<dyn PriceOracle>,
        vault: Arc<CredentialVault>,
        locks: Arc<UserLocks>,
        history: HistoryService,
        source_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            oracle,
            vault,
            locks,
            history,
            valuation: ValuationService::new(),
            source_timeout,
        }
    }

    /// Build the balance request for an integration, decrypting exchange
    /// credentials. Plaintext never outlives the request.
    pub fn balance_request(&self, user_id: Uuid, integration: &Integration) -> Result<BalanceRequest, CoreError> {
        match &integration.target {
            IntegrationTarget::Credentials(creds) => {
                let key = self.vault.decrypt(&creds.api_key)?;
                let secret = self.vault.decrypt(&creds.api_secret)?;
                Ok(BalanceRequest::api_key(user_id, key, secret))
            }
            IntegrationTarget::Address(address) => Ok(BalanceRequest::address(user_id, address.as_str())),
        }
    }

    /// Fetch one integration's balances: resolve the source, decrypt, call it
    /// under the source timeout.
    async fn fetch_integration(
        &self,
        user_id: Uuid,
        integration: &Integration,
    ) -> Result<Vec<AssetBalance>, CoreError> {
        let source = self
            .registry
            .get(integration.kind, &integration.provider_name)
            .ok_or_else(|| CoreError::UnsupportedProvider {
                kind: integration.kind.to_string(),
                provider: integration.provider_name.clone(),
            })?;

        let request = self.balance_request(user_id, integration)?;

        tokio::time::timeout(self.source_timeout, source.get_balances(&request))
            .await
            .map_err(|_| CoreError::Timeout {
                operation: format!("{} balance fetch", integration.provider_name),
                seconds: self.source_timeout.as_secs(),
            })?
    }

    /// Run a full sync for one user.
    ///
    /// Only a missing user or a store failure fails the call; per-integration
    /// failures are logged and reported in the returned statuses.
    pub async fn sync_portfolio(&self, user_id: Uuid) -> Result<SyncReport, CoreError> {
        let _guard = self.locks.lock(user_id).await;

        let mut user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        let mut portfolio = self
            .store
            .get_portfolio(user_id)
            .await?
            .unwrap_or_else(|| Portfolio::new(user_id));

        // 1. Fan out to every active integration
        let active: Vec<&Integration> = user.active_integrations().collect();
        let results = join_all(
            active
                .iter()
                .map(|integration| self.fetch_integration(user_id, integration)),
        )
        .await;
        let mut fetched: HashMap<Uuid, Result<Vec<AssetBalance>, CoreError>> = active
            .iter()
            .map(|i| i.id)
            .zip(results)
            .collect();

        // 2. Walk integrations in list order, collecting statuses and contributions
        let mut statuses = Vec::with_capacity(user.integrations.len());
        let mut contributions = Vec::new();
        for integration in &user.integrations {
            let outcome = match fetched.remove(&integration.id) {
                None => IntegrationOutcome::Skipped,
                Some(Ok(balances)) => {
                    let positive: Vec<AssetBalance> =
                        balances.into_iter().filter(|b| b.amount > 0.0).collect();
                    debug!(
                        %user_id,
                        integration_id = %integration.id,
                        provider = %integration.provider_name,
                        balances = positive.len(),
                        "Integration synced"
                    );
                    let count = positive.len();
                    contributions.push(SourceBalances {
                        provider_name: integration.provider_name.clone(),
                        kind: integration.kind,
                        balances: positive,
                    });
                    IntegrationOutcome::Synced { balances: count }
                }
                Some(Err(e)) => {
                    warn!(
                        %user_id,
                        integration_id = %integration.id,
                        provider = %integration.provider_name,
                        error = %e,
                        "Integration sync failed, continuing without it"
                    );
                    IntegrationOutcome::Failed { error: e.to_string() }
                }
            };
            statuses.push(IntegrationSyncStatus {
                integration_id: integration.id,
                provider_name: integration.provider_name.clone(),
                kind: integration.kind,
                outcome,
            });
        }

        // 3. Merge, then price every symbol in one oracle call
        let holdings = merge_balances(&contributions);
        let symbols: HashSet<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let prices = if symbols.is_empty() {
            Default::default()
        } else {
            self.oracle.get_prices(&symbols).await
        };

        // 4. Rebuild the portfolio wholesale and persist once
        let now = Utc::now();
        portfolio.assets = self
            .valuation
            .value_holdings(holdings, &prices, self.oracle.as_ref(), now);
        portfolio.recompute_totals();
        portfolio.last_sync = Some(now);
        self.history.record_snapshot(&mut portfolio, now);

        let saved = self.store.save_portfolio(&portfolio).await?;

        user.last_sync = Some(now);
        self.store.save_user(&user).await?;

        let report = SyncReport {
            assets_updated: saved.assets.len(),
            last_sync: now,
            total_value: saved.total_value,
            integrations: statuses,
        };

        info!(
            %user_id,
            assets = report.assets_updated,
            total_value = report.total_value,
            failed = report.failed_count(),
            "Portfolio synced"
        );

        Ok(report)
    }
}
