use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which family of source an integration points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    /// Keyed exchange account (API key + secret)
    Exchange,
    /// Public on-chain address
    Wallet,
}

impl IntegrationKind {
    /// Label used when deriving a display name ("MetaMask Wallet 2").
    pub fn label(&self) -> &'static str {
        match self {
            IntegrationKind::Exchange => "Exchange",
            IntegrationKind::Wallet => "Wallet",
        }
    }
}

impl std::fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationKind::Exchange => write!(f, "exchange"),
            IntegrationKind::Wallet => write!(f, "wallet"),
        }
    }
}

/// Exchange API key and secret, each encrypted on its own by the credential vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedCredentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Where a source reads from. Exactly one of the two is populated, governed by `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationTarget {
    Credentials(EncryptedCredentials),
    Address(String),
}

/// One exchange account or wallet address linked by a user.
///
/// Stored flat: `credentialsEncrypted` for exchanges, `walletAddress` for wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "IntegrationRecord", try_from = "IntegrationRecord")]
pub struct Integration {
    pub id: Uuid,
    pub kind: IntegrationKind,
    /// Source implementation, e.g. "Binance", "MetaMask", "Phantom"
    pub provider_name: String,
    /// User-assigned label; derived on read when absent
    pub display_name: Option<String>,
    pub target: IntegrationTarget,
    /// Inactive integrations are skipped during sync
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntegrationRecord {
    id: Uuid,
    kind: IntegrationKind,
    provider_name: String,
    display_name: Option<String>,
    credentials_encrypted: Option<EncryptedCredentials>,
    wallet_address: Option<String>,
    is_active: bool,
    added_at: DateTime<Utc>,
}

impl From<Integration> for IntegrationRecord {
    fn from(i: Integration) -> Self {
        let (credentials_encrypted, wallet_address) = match i.target {
            IntegrationTarget::Credentials(c) => (Some(c), None),
            IntegrationTarget::Address(a) => (None, Some(a)),
        };
        Self {
            id: i.id,
            kind: i.kind,
            provider_name: i.provider_name,
            display_name: i.display_name,
            credentials_encrypted,
            wallet_address,
            is_active: i.is_active,
            added_at: i.added_at,
        }
    }
}

impl TryFrom<IntegrationRecord> for Integration {
    type Error = String;

    fn try_from(r: IntegrationRecord) -> Result<Self, Self::Error> {
        let target = match (r.kind, r.credentials_encrypted, r.wallet_address) {
            (IntegrationKind::Exchange, Some(c), None) => IntegrationTarget::Credentials(c),
            (IntegrationKind::Wallet, None, Some(a)) => IntegrationTarget::Address(a),
            (IntegrationKind::Exchange, _, _) => {
                return Err(format!(
                    "exchange integration {} needs credentialsEncrypted and no walletAddress",
                    r.id
                ))
            }
            (IntegrationKind::Wallet, _, _) => {
                return Err(format!(
                    "wallet integration {} needs walletAddress and no credentialsEncrypted",
                    r.id
                ))
            }
        };
        Ok(Self {
            id: r.id,
            kind: r.kind,
            provider_name: r.provider_name,
            display_name: r.display_name,
            target,
            is_active: r.is_active,
            added_at: r.added_at,
        })
    }
}

impl Integration {
    pub fn exchange(provider_name: impl Into<String>, credentials: EncryptedCredentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: IntegrationKind::Exchange,
            provider_name: provider_name.into(),
            display_name: None,
            target: IntegrationTarget::Credentials(credentials),
            is_active: true,
            added_at: Utc::now(),
        }
    }

    pub fn wallet(provider_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: IntegrationKind::Wallet,
            provider_name: provider_name.into(),
            display_name: None,
            target: IntegrationTarget::Address(address.into()),
            is_active: true,
            added_at: Utc::now(),
        }
    }

    pub fn credentials(&self) -> Option<&EncryptedCredentials> {
        match &self.target {
            IntegrationTarget::Credentials(c) => Some(c),
            IntegrationTarget::Address(_) => None,
        }
    }

    pub fn wallet_address(&self) -> Option<&str> {
        match &self.target {
            IntegrationTarget::Address(a) => Some(a),
            IntegrationTarget::Credentials(_) => None,
        }
    }
}

/// Resolve the label shown for `integrations[index]`, or `None` when out of range.
///
/// An explicit display name wins. Otherwise the name is
/// `"{provider} {Wallet|Exchange} {N}"`, where N is the 1-based position among
/// integrations sharing the same provider and kind, in list (creation) order.
pub fn derive_display_name(integrations: &[Integration], index: usize) -> Option<String> {
    let integration = integrations.get(index)?;
    if let Some(name) = integration
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
    {
        return Some(name.to_string());
    }

    let ordinal = integrations[..=index]
        .iter()
        .filter(|i| i.provider_name == integration.provider_name && i.kind == integration.kind)
        .count();

    Some(format!(
        "{} {} {}",
        integration.provider_name,
        integration.kind.label(),
        ordinal
    ))
}

/// Read-side projection of an integration: no credential material leaves the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationView {
    pub id: Uuid,
    pub kind: IntegrationKind,
    pub provider_name: String,
    pub display_name: String,
    pub wallet_address: Option<String>,
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}

impl IntegrationView {
    /// Project every integration of a user, deriving display names as needed.
    pub fn list(integrations: &[Integration]) -> Vec<IntegrationView> {
        integrations
            .iter()
            .enumerate()
            .filter_map(|(idx, i)| {
                Some(IntegrationView {
                    id: i.id,
                    kind: i.kind,
                    provider_name: i.provider_name.clone(),
                    display_name: derive_display_name(integrations, idx)?,
                    wallet_address: i.wallet_address().map(str::to_string),
                    is_active: i.is_active,
                    added_at: i.added_at,
                })
            })
            .collect()
    }
}
