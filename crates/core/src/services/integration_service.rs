use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::integration::{EncryptedCredentials, Integration, IntegrationKind, IntegrationView};
use crate::models::sync::CredentialCheck;
use crate::models::user::User;
use crate::providers::registry::SourceRegistry;
use crate::providers::traits::BalanceRequest;
use crate::services::locks::UserLocks;
use crate::storage::encryption::CredentialVault;
use crate::storage::store::DocumentStore;

/// Create, edit and remove the integrations a user links.
///
/// Edits take the same per-user lock as the sync engine so an integration
/// added mid-sync is never lost when the sync saves the user record.
pub struct IntegrationService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<SourceRegistry>,
    vault: Arc<CredentialVault>,
    locks: Arc<UserLocks>,
}

impl IntegrationService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<SourceRegistry>,
        vault: Arc<CredentialVault>,
        locks: Arc<UserLocks>,
    ) -> Self {
        Self {
            store,
            registry,
            vault,
            locks,
        }
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, CoreError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))
    }

    fn ensure_supported(&self, kind: IntegrationKind, provider: &str) -> Result<(), CoreError> {
        if self.registry.is_supported(kind, provider) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedProvider {
                kind: kind.to_string(),
                provider: provider.to_string(),
            })
        }
    }

    fn view_of(user: &User, integration_id: Uuid) -> Result<IntegrationView, CoreError> {
        IntegrationView::list(&user.integrations)
            .into_iter()
            .find(|v| v.id == integration_id)
            .ok_or_else(|| CoreError::IntegrationNotFound(integration_id.to_string()))
    }

    /// Check exchange keys with one live balance fetch (or none, for the
    /// sentinel pair). Unknown providers are `Invalid`.
    pub async fn validate_credentials(
        &self,
        user_id: Uuid,
        provider: &str,
        api_key: &str,
        api_secret: &str,
    ) -> CredentialCheck {
        match self.registry.get(IntegrationKind::Exchange, provider) {
            Some(source) => {
                source
                    .validate_credentials(&BalanceRequest::api_key(user_id, api_key, api_secret))
                    .await
            }
            None => CredentialCheck::Invalid(format!("Unsupported exchange: {provider}")),
        }
    }

    /// Link an exchange account. Key and secret are checked against the
    /// exchange, then encrypted separately.
    pub async fn add_exchange_integration(
        &self,
        user_id: Uuid,
        provider: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<IntegrationView, CoreError> {
        let (provider, api_key, api_secret) = (provider.trim(), api_key.trim(), api_secret.trim());
        if provider.is_empty() || api_key.is_empty() || api_secret.is_empty() {
            return Err(CoreError::ValidationError(
                "Exchange, API key and API secret are required".into(),
            ));
        }
        self.ensure_supported(IntegrationKind::Exchange, provider)?;

        let has_exchange = |user: &User| {
            user.integrations
                .iter()
                .any(|i| i.kind == IntegrationKind::Exchange && i.provider_name == provider)
        };

        // Cheap rejection before the network round-trip; re-checked under the lock.
        if has_exchange(&self.load_user(user_id).await?) {
            return Err(CoreError::DuplicateIntegration(format!("{provider} exchange")));
        }

        match self.validate_credentials(user_id, provider, api_key, api_secret).await {
            CredentialCheck::Valid => {}
            CredentialCheck::Invalid(reason) => {
                return Err(CoreError::ValidationError(format!("Invalid API credentials: {reason}")));
            }
            CredentialCheck::Unavailable(reason) => {
                return Err(CoreError::Api {
                    provider: provider.to_string(),
                    message: format!("Could not verify credentials: {reason}"),
                });
            }
        }

        let credentials = EncryptedCredentials {
            api_key: self.vault.encrypt(api_key)?,
            api_secret: self.vault.encrypt(api_secret)?,
        };

        let _guard = self.locks.lock(user_id).await;
        let mut user = self.load_user(user_id).await?;
        if has_exchange(&user) {
            return Err(CoreError::DuplicateIntegration(format!("{provider} exchange")));
        }

        let integration = Integration::exchange(provider, credentials);
        let id = integration.id;
        user.integrations.push(integration);
        self.store.save_user(&user).await?;

        info!(%user_id, integration_id = %id, provider, "Exchange integration added");
        Self::view_of(&user, id)
    }

    /// Link a wallet address.
    pub async fn add_wallet_integration(
        &self,
        user_id: Uuid,
        provider: &str,
        address: &str,
    ) -> Result<IntegrationView, CoreError> {
        let (provider, address) = (provider.trim(), address.trim());
        if provider.is_empty() || address.is_empty() {
            return Err(CoreError::ValidationError(
                "Wallet type and address are required".into(),
            ));
        }
        let source = self
            .registry
            .get(IntegrationKind::Wallet, provider)
            .ok_or_else(|| CoreError::UnsupportedProvider {
                kind: IntegrationKind::Wallet.to_string(),
                provider: provider.to_string(),
            })?;
        source.validate_address(address)?;

        let _guard = self.locks.lock(user_id).await;
        let mut user = self.load_user(user_id).await?;
        if user
            .integrations
            .iter()
            .filter_map(Integration::wallet_address)
            .any(|existing| same_address(existing, address))
        {
            return Err(CoreError::DuplicateIntegration(format!("wallet {address}")));
        }

        let integration = Integration::wallet(provider, address);
        let id = integration.id;
        user.integrations.push(integration);
        self.store.save_user(&user).await?;

        info!(%user_id, integration_id = %id, provider, "Wallet integration added");
        Self::view_of(&user, id)
    }

    /// Unlink an integration and delete every transaction recorded for it.
    /// Returns how many transactions were removed.
    pub async fn remove_integration(&self, user_id: Uuid, integration_id: Uuid) -> Result<usize, CoreError> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.load_user(user_id).await?;

        let before = user.integrations.len();
        user.integrations.retain(|i| i.id != integration_id);
        if user.integrations.len() == before {
            return Err(CoreError::IntegrationNotFound(integration_id.to_string()));
        }
        self.store.save_user(&user).await?;

        let removed = self
            .store
            .delete_transactions_for_integration(user_id, integration_id)
            .await?;

        info!(%user_id, %integration_id, transactions_removed = removed, "Integration removed");
        Ok(removed)
    }

    /// Set or clear the user-assigned label. Blank names clear it.
    pub async fn rename_integration(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
        display_name: Option<String>,
    ) -> Result<IntegrationView, CoreError> {
        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.update(user_id, integration_id, |i| i.display_name = display_name)
            .await
    }

    pub async fn set_integration_active(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
        active: bool,
    ) -> Result<IntegrationView, CoreError> {
        self.update(user_id, integration_id, |i| i.is_active = active)
            .await
    }

    async fn update(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
        apply: impl FnOnce(&mut Integration),
    ) -> Result<IntegrationView, CoreError> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.load_user(user_id).await?;
        let integration = user
            .integration_mut(integration_id)
            .ok_or_else(|| CoreError::IntegrationNotFound(integration_id.to_string()))?;
        apply(integration);
        self.store.save_user(&user).await?;
        Self::view_of(&user, integration_id)
    }

    /// Every integration of a user with derived display names; no credential material.
    pub async fn list_integrations(&self, user_id: Uuid) -> Result<Vec<IntegrationView>, CoreError> {
        let user = self.load_user(user_id).await?;
        Ok(IntegrationView::list(&user.integrations))
    }
}

/// EVM addresses are case-insensitive (checksum casing); base58 addresses are not.
fn same_address(a: &str, b: &str) -> bool {
    if a.starts_with("0x") && b.starts_with("0x") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
