use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::errors::CoreError;
use crate::models::asset::AssetBalance;
use crate::models::integration::IntegrationKind;

use super::http::parse_amount;
use super::simulated::{is_sentinel, SimulatedExchange};
use super::traits::{BalanceRequest, BalanceSource};

type HmacSha256 = Hmac<Sha256>;

/// Static description of one keyed exchange REST API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: &'static str,
    pub base_url: String,
    /// Header carrying the API key
    pub key_header: &'static str,
    /// Error codes the exchange uses for rejected keys or signatures
    pub auth_error_codes: &'static [i64],
}

impl ExchangeSpec {
    pub fn binance() -> Self {
        Self {
            name: "Binance",
            base_url: "https://api.binance.com".into(),
            key_header: "X-MBX-APIKEY",
            auth_error_codes: &[-1022, -2014, -2015],
        }
    }

    pub fn mexc() -> Self {
        Self {
            name: "MEXC",
            base_url: "https://api.mexc.com".into(),
            key_header: "X-MEXC-APIKEY",
            auth_error_codes: &[700002, 10072, 602],
        }
    }

    /// Point the client at another host (staging, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// HMAC-SHA256 of the canonical query string, hex-encoded.
pub fn sign_query(secret: &str, query: &str) -> Result<String, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::Credential(format!("Unusable API secret: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signed `GET /api/v3/account` client shared by Binance-compatible exchanges.
///
/// The literal sentinel key/secret pair is served by the simulated exchange
/// before any request is built.
pub struct ExchangeSource {
    spec: ExchangeSpec,
    client: Client,
    simulated: Arc<SimulatedExchange>,
}

impl ExchangeSource {
    pub fn new(spec: ExchangeSpec, client: Client, simulated: Arc<SimulatedExchange>) -> Self {
        Self {
            spec,
            client,
            simulated,
        }
    }

    pub fn spec(&self) -> &ExchangeSpec {
        &self.spec
    }

    async fn fetch_account(&self, api_key: &str, api_secret: &str) -> Result<Vec<AssetBalance>, CoreError> {
        let query = format!("timestamp={}", Utc::now().timestamp_millis());
        let signature = sign_query(api_secret, &query)?;
        let url = format!("{}/api/v3/account?{query}&signature={signature}", self.spec.base_url);

        let resp = self
            .client
            .get(&url)
            .header(self.spec.key_header, api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.classify_error(status, &body));
        }

        let account: AccountResponse = resp.json().await.map_err(|e| CoreError::Api {
            provider: self.spec.name.into(),
            message: format!("Failed to parse account response: {e}"),
        })?;

        Ok(account
            .balances
            .into_iter()
            .filter_map(|b| {
                let amount = parse_amount(&b.free) + parse_amount(&b.locked);
                (amount > 0.0).then(|| AssetBalance::new(b.asset, amount))
            })
            .collect())
    }

    fn classify_error(&self, status: StatusCode, body: &str) -> CoreError {
        let parsed: Option<ExchangeError> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.msg.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));
        let code_is_auth = parsed
            .as_ref()
            .and_then(|e| e.code)
            .is_some_and(|c| self.spec.auth_error_codes.contains(&c));

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || code_is_auth {
            CoreError::Auth {
                provider: self.spec.name.into(),
                message,
            }
        } else {
            CoreError::Api {
                provider: self.spec.name.into(),
                message: format!("HTTP {status}: {message}"),
            }
        }
    }
}

// ── Exchange API response types ─────────────────────────────────────

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<RawBalance>,
}

#[derive(Deserialize)]
struct RawBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct ExchangeError {
    code: Option<i64>,
    msg: Option<String>,
}

#[async_trait]
impl BalanceSource for ExchangeSource {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Exchange
    }

    async fn get_balances(&self, request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError> {
        let (api_key, api_secret) = request.key_pair()?;

        if is_sentinel(api_key, api_secret) {
            debug!(provider = self.spec.name, user_id = %request.user_id, "Sentinel credentials, using simulated balances");
            return Ok(self.simulated.balances(request.user_id, self.spec.name));
        }

        self.fetch_account(api_key, api_secret).await
    }
}
