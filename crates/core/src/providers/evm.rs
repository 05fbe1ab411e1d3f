use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::errors::CoreError;
use crate::models::asset::AssetBalance;
use crate::models::integration::IntegrationKind;
use crate::models::transaction::{SourceTransaction, TransactionAsset, TransactionStatus, TransactionType};

use super::http::{check_status, json_rpc, parse_amount, with_backoff, RetryPolicy};
use super::traits::{BalanceRequest, BalanceSource};

const PROVIDER: &str = "MetaMask";
const EXPLORER: &str = "Etherscan";

/// `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

const ETH_DECIMALS: u32 = 18;

// ── Pure helpers ────────────────────────────────────────────────────

/// `0x` + 40 hex digits.
pub fn is_valid_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Convert a JSON-RPC hex quantity (up to 256 bits) to a decimal amount.
/// `"0x"` and `"0x0"` are zero.
pub fn hex_quantity_to_f64(quantity: &str, decimals: u32) -> Result<f64, CoreError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Expected hex quantity, got '{quantity}'"),
        })?;

    let mut raw = 0f64;
    for c in digits.chars() {
        let d = c.to_digit(16).ok_or_else(|| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Invalid hex digit in '{quantity}'"),
        })?;
        raw = raw * 16.0 + f64::from(d);
    }
    Ok(raw / 10f64.powi(decimals as i32))
}

/// Calldata for `balanceOf(owner)`.
pub fn balance_of_calldata(owner: &str) -> Result<String, CoreError> {
    if !is_valid_evm_address(owner) {
        return Err(CoreError::ValidationError(format!("Invalid EVM address: {owner}")));
    }
    Ok(format!("0x{BALANCE_OF_SELECTOR}{:0>64}", owner[2..].to_lowercase()))
}

/// A token contract discovered from transfer history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContract {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
}

/// Distinct contracts in first-seen order. Contract addresses compare case-insensitively.
pub fn distinct_token_contracts(transfers: &[TokenTransfer]) -> Vec<TokenContract> {
    let mut seen = HashSet::new();
    transfers
        .iter()
        .filter(|t| seen.insert(t.contract_address.to_lowercase()))
        .map(|t| TokenContract {
            address: t.contract_address.clone(),
            symbol: t.token_symbol.clone(),
            name: if t.token_name.is_empty() {
                t.token_symbol.clone()
            } else {
                t.token_name.clone()
            },
            decimals: t.token_decimal.trim().parse().unwrap_or(0),
        })
        .collect()
}

fn direction(address: &str, to: &str) -> TransactionType {
    if to.eq_ignore_ascii_case(address) {
        TransactionType::Received
    } else {
        TransactionType::Sent
    }
}

fn explorer_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(raw.trim().parse().ok()?, 0)
}

/// Native ETH movements with a non-zero value.
pub fn native_transactions(address: &str, txs: &[ExplorerTx]) -> Vec<SourceTransaction> {
    txs.iter()
        .filter_map(|tx| {
            let amount = parse_amount(&tx.value) / 10f64.powi(ETH_DECIMALS as i32);
            if amount <= 0.0 {
                return None;
            }
            let status = match tx.is_error.as_deref() {
                Some("0") | None => TransactionStatus::Completed,
                Some(_) => TransactionStatus::Failed,
            };
            Some(SourceTransaction {
                tx_type: direction(address, &tx.to),
                asset: TransactionAsset::new("ETH", "Ethereum", amount),
                value: 0.0,
                tx_hash: Some(tx.hash.clone()),
                timestamp: explorer_time(&tx.time_stamp)?,
                status: Some(status),
            })
        })
        .collect()
}

/// ERC-20 movements, amounts scaled by the token's decimals.
pub fn token_transactions(address: &str, transfers: &[TokenTransfer]) -> Vec<SourceTransaction> {
    transfers
        .iter()
        .filter_map(|t| {
            let decimals: i32 = t.token_decimal.trim().parse().unwrap_or(0);
            let amount = parse_amount(&t.value) / 10f64.powi(decimals);
            if amount <= 0.0 {
                return None;
            }
            Some(SourceTransaction {
                tx_type: direction(address, &t.to),
                asset: TransactionAsset::new(t.token_symbol.as_str(), t.token_name.as_str(), amount),
                value: 0.0,
                tx_hash: Some(t.hash.clone()),
                timestamp: explorer_time(&t.time_stamp)?,
                status: Some(TransactionStatus::Completed),
            })
        })
        .collect()
}

// ── Explorer response types ─────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorerTx {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Wei, decimal string
    pub value: String,
    /// Unix seconds, decimal string
    pub time_stamp: String,
    pub is_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenTransfer {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub time_stamp: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: String,
}

#[derive(Deserialize)]
struct ExplorerEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

/// Interpret an explorer envelope: a result array, an empty history, or an error.
fn decode_explorer_result<T: serde::de::DeserializeOwned>(body: ExplorerEnvelope) -> Result<Vec<T>, CoreError> {
    let ExplorerEnvelope { status, message, result } = body;
    match result {
        Value::Array(rows) => serde_json::from_value(Value::Array(rows)).map_err(|e| CoreError::Api {
            provider: EXPLORER.into(),
            message: format!("Unexpected explorer rows: {e}"),
        }),
        _ if message.starts_with("No transactions found") => Ok(Vec::new()),
        Value::String(detail) => Err(CoreError::Api {
            provider: EXPLORER.into(),
            message: format!("{message} ({status}): {detail}"),
        }),
        other => Err(CoreError::Api {
            provider: EXPLORER.into(),
            message: format!("{message}: unexpected result {other}"),
        }),
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Ethereum mainnet wallet reader.
///
/// Native ETH comes from JSON-RPC `eth_getBalance`. ERC-20 holdings are found
/// by scanning the address's full token-transfer history on the block
/// explorer, collecting every distinct contract ever touched, then calling
/// `balanceOf` on each one.
///
/// Cost: one RPC call per distinct token the address has *ever* received,
/// on every sync. Wallets with long airdrop histories are slow to sync; the
/// explorer scan is paginated and capped at `explorer_max_pages`.
pub struct EvmWalletSource {
    client: Client,
    rpc_url: String,
    explorer_url: String,
    explorer_key: Option<String>,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: u32,
}

impl EvmWalletSource {
    pub fn new(client: Client, config: &SyncConfig) -> Self {
        Self {
            client,
            rpc_url: config.eth_rpc_url.clone(),
            explorer_url: config.etherscan_base_url.clone(),
            explorer_key: config.etherscan_api_key.clone(),
            retry: RetryPolicy::new(
                config.explorer_retry_attempts,
                Duration::from_millis(config.explorer_retry_delay_ms),
            ),
            page_size: config.explorer_page_size,
            max_pages: config.explorer_max_pages,
        }
    }

    async fn native_balance(&self, address: &str) -> Result<f64, CoreError> {
        let wei: String = json_rpc(
            &self.client,
            &self.rpc_url,
            PROVIDER,
            "eth_getBalance",
            json!([address, "latest"]),
        )
        .await?;
        hex_quantity_to_f64(&wei, ETH_DECIMALS)
    }

    async fn token_balance(&self, owner: &str, token: &TokenContract) -> Result<f64, CoreError> {
        let data = balance_of_calldata(owner)?;
        let raw: String = json_rpc(
            &self.client,
            &self.rpc_url,
            PROVIDER,
            "eth_call",
            json!([{ "to": token.address, "data": data }, "latest"]),
        )
        .await?;
        hex_quantity_to_f64(&raw, token.decimals)
    }

    /// One explorer page, retried with backoff on rate limits.
    async fn explorer_page<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        address: &str,
        page: u32,
        offset: u32,
    ) -> Result<Vec<T>, CoreError> {
        let page_param = page.to_string();
        let offset_param = offset.to_string();
        let (page, offset) = (page_param.as_str(), offset_param.as_str());
        with_backoff(self.retry, action, || async move {
            let mut params = vec![
                ("module", "account"),
                ("action", action),
                ("address", address),
                ("startblock", "0"),
                ("endblock", "999999999"),
                ("page", page),
                ("offset", offset),
                ("sort", "desc"),
            ];
            if let Some(key) = &self.explorer_key {
                params.push(("apikey", key.as_str()));
            }

            let resp = self.client.get(&self.explorer_url).query(&params).send().await?;
            let resp = check_status(EXPLORER, resp).await?;
            let body: ExplorerEnvelope = resp.json().await.map_err(|e| CoreError::Api {
                provider: EXPLORER.into(),
                message: format!("Failed to parse {action} response: {e}"),
            })?;
            decode_explorer_result(body)
        })
        .await
    }

    /// Full token-transfer history, newest first, up to the page cap.
    async fn all_token_transfers(&self, address: &str) -> Result<Vec<TokenTransfer>, CoreError> {
        let mut transfers = Vec::new();
        for page in 1..=self.max_pages.max(1) {
            let rows: Vec<TokenTransfer> = self
                .explorer_page("tokentx", address, page, self.page_size)
                .await?;
            let last_page = rows.len() < self.page_size as usize;
            transfers.extend(rows);
            if last_page {
                return Ok(transfers);
            }
        }
        warn!(address, pages = self.max_pages, "Token history truncated at page cap");
        Ok(transfers)
    }
}

#[async_trait]
impl BalanceSource for EvmWalletSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Wallet
    }

    async fn get_balances(&self, request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError> {
        let address = request.wallet_address()?;
        let mut balances = Vec::new();

        let eth = self.native_balance(address).await?;
        if eth > 0.0 {
            balances.push(AssetBalance::named("ETH", eth, "Ethereum"));
        }

        // Token discovery is best-effort: without the explorer we still report ETH.
        let transfers = match self.all_token_transfers(address).await {
            Ok(t) => t,
            Err(e) => {
                warn!(address, error = %e, "Token discovery failed, reporting native balance only");
                return Ok(balances);
            }
        };

        let tokens = distinct_token_contracts(&transfers);
        debug!(address, tokens = tokens.len(), "Checking token balances");
        for token in &tokens {
            match self.token_balance(address, token).await {
                Ok(amount) if amount > 0.0 => {
                    balances.push(AssetBalance::named(token.symbol.as_str(), amount, token.name.as_str()));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(contract = %token.address, symbol = %token.symbol, error = %e, "Token balance lookup failed");
                }
            }
        }

        Ok(balances)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn get_recent_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SourceTransaction>, CoreError> {
        let offset = u32::try_from(limit).unwrap_or(u32::MAX).max(1);
        let native: Vec<ExplorerTx> = self.explorer_page("txlist", address, 1, offset).await?;
        let tokens: Vec<TokenTransfer> = self.explorer_page("tokentx", address, 1, offset).await?;

        let mut txs = native_transactions(address, &native);
        txs.extend(token_transactions(address, &tokens));
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs.truncate(limit);
        Ok(txs)
    }

    fn validate_address(&self, address: &str) -> Result<(), CoreError> {
        if is_valid_evm_address(address) {
            Ok(())
        } else {
            Err(CoreError::ValidationError(format!(
                "Invalid Ethereum address '{address}': expected 0x followed by 40 hex characters"
            )))
        }
    }
}
