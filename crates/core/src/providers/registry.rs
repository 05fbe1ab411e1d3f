use std::sync::Arc;

use reqwest::Client;

use crate::config::SyncConfig;
use crate::models::integration::IntegrationKind;

use super::exchange::{ExchangeSource, ExchangeSpec};
use super::evm::EvmWalletSource;
use super::simulated::SimulatedExchange;
use super::solana::SolanaWalletSource;
use super::traits::BalanceSource;

/// Registry of all balance sources, keyed by `(kind, provider name)`.
///
/// Sources are registered once at startup. Adding a provider is a new
/// `register` call; the sync engine never branches on provider names.
pub struct SourceRegistry {
    /// Registration order is kept so `supported` lists are stable
    sources: Vec<Arc<dyn BalanceSource>>,
    simulated: Arc<SimulatedExchange>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            simulated: Arc::new(SimulatedExchange::new()),
        }
    }

    /// Create a registry with every built-in source pre-configured:
    /// Binance and MEXC exchanges, MetaMask (EVM) and Phantom (Solana) wallets.
    pub fn new_with_defaults(client: Client, config: &SyncConfig) -> Self {
        let mut registry = Self::new();
        let simulated = registry.simulated();

        registry.register(Arc::new(ExchangeSource::new(
            ExchangeSpec::mexc(),
            client.clone(),
            simulated.clone(),
        )));
        registry.register(Arc::new(ExchangeSource::new(
            ExchangeSpec::binance(),
            client.clone(),
            simulated,
        )));
        registry.register(Arc::new(EvmWalletSource::new(client.clone(), config)));
        registry.register(Arc::new(SolanaWalletSource::new(client, config)));

        registry
    }

    /// Register a source. A later registration with the same `(kind, name)`
    /// replaces the earlier one.
    pub fn register(&mut self, source: Arc<dyn BalanceSource>) {
        self.sources
            .retain(|s| !(s.kind() == source.kind() && s.name() == source.name()));
        self.sources.push(source);
    }

    /// Look up the source for an integration. Provider names match exactly.
    pub fn get(&self, kind: IntegrationKind, provider_name: &str) -> Option<Arc<dyn BalanceSource>> {
        self.sources
            .iter()
            .find(|s| s.kind() == kind && s.name() == provider_name)
            .cloned()
    }

    pub fn is_supported(&self, kind: IntegrationKind, provider_name: &str) -> bool {
        self.get(kind, provider_name).is_some()
    }

    /// Provider names registered for a kind, in registration order.
    pub fn supported(&self, kind: IntegrationKind) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| s.name().to_string())
            .collect()
    }

    /// The simulated exchange shared by every exchange source for sentinel credentials.
    pub fn simulated(&self) -> Arc<SimulatedExchange> {
        Arc::clone(&self.simulated)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
