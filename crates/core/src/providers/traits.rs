use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::asset::AssetBalance;
use crate::models::integration::IntegrationKind;
use crate::models::price::PriceMap;
use crate::models::sync::CredentialCheck;
use crate::models::transaction::SourceTransaction;

/// Decrypted access material for one balance fetch.
///
/// Plaintext credentials only ever live in this struct for the duration of a
/// single call; they are never persisted.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceCredentials {
    ApiKey { key: String, secret: String },
    Address(String),
}

impl std::fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceCredentials::ApiKey { .. } => f.write_str("ApiKey(<redacted>)"),
            SourceCredentials::Address(a) => f.debug_tuple("Address").field(a).finish(),
        }
    }
}

/// One "get current balances" call against a source.
#[derive(Debug, Clone)]
pub struct BalanceRequest {
    /// Owner of the integration; the simulated source keys its state on it
    pub user_id: Uuid,
    pub credentials: SourceCredentials,
}

impl BalanceRequest {
    pub fn api_key(user_id: Uuid, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user_id,
            credentials: SourceCredentials::ApiKey {
                key: key.into(),
                secret: secret.into(),
            },
        }
    }

    pub fn address(user_id: Uuid, address: impl Into<String>) -> Self {
        Self {
            user_id,
            credentials: SourceCredentials::Address(address.into()),
        }
    }

    /// The (key, secret) pair, or a credential error for address-based requests.
    pub fn key_pair(&self) -> Result<(&str, &str), CoreError> {
        match &self.credentials {
            SourceCredentials::ApiKey { key, secret } => Ok((key, secret)),
            SourceCredentials::Address(_) => Err(CoreError::Credential(
                "exchange source requires an API key and secret".into(),
            )),
        }
    }

    pub fn wallet_address(&self) -> Result<&str, CoreError> {
        match &self.credentials {
            SourceCredentials::Address(a) => Ok(a),
            SourceCredentials::ApiKey { .. } => Err(CoreError::Credential(
                "wallet source requires an address".into(),
            )),
        }
    }
}

/// Capability shared by every balance source (exchanges, chain readers, the
/// simulated source).
///
/// Sources are registered once at startup and looked up by
/// `(kind, name)`, so adding a provider never touches the sync engine.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Provider name as stored on integrations ("Binance", "MetaMask", ...).
    fn name(&self) -> &str;

    fn kind(&self) -> IntegrationKind;

    /// Current holdings. Only strictly positive balances are returned.
    async fn get_balances(&self, request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError>;

    /// Whether [`BalanceSource::get_recent_transactions`] returns anything.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Up to `limit` most recent movements for a wallet address, newest first.
    async fn get_recent_transactions(
        &self,
        _address: &str,
        _limit: usize,
    ) -> Result<Vec<SourceTransaction>, CoreError> {
        Ok(Vec::new())
    }

    /// Syntactic check of a wallet address before it is linked.
    fn validate_address(&self, _address: &str) -> Result<(), CoreError> {
        Ok(())
    }

    /// Try one balance fetch and classify the outcome.
    ///
    /// Transient failures come back as `Unavailable` so the caller can retry
    /// instead of telling the user their keys are wrong.
    async fn validate_credentials(&self, request: &BalanceRequest) -> CredentialCheck {
        match self.get_balances(request).await {
            Ok(_) => CredentialCheck::Valid,
            Err(e) if e.is_transient() => CredentialCheck::Unavailable(e.to_string()),
            Err(e) => CredentialCheck::Invalid(e.to_string()),
        }
    }
}

/// Spot prices for a set of ticker symbols.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Prices keyed by uppercase symbol.
    ///
    /// Never fails: unknown symbols are absent from the result and an
    /// upstream outage yields an empty map, so valuation degrades to zero
    /// instead of aborting a sync.
    async fn get_prices(&self, symbols: &HashSet<String>) -> PriceMap;

    /// Display name for a symbol, when the oracle knows one.
    fn asset_name(&self, _symbol: &str) -> Option<String> {
        None
    }
}
