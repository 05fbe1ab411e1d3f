use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::errors::CoreError;
use crate::models::asset::AssetBalance;
use crate::models::integration::IntegrationKind;
use crate::models::transaction::{SourceTransaction, TransactionAsset, TransactionStatus, TransactionType};

use super::http::json_rpc;
use super::traits::{BalanceRequest, BalanceSource};

const PROVIDER: &str = "Phantom";

const LAMPORTS_PER_SOL: f64 = 1e9;

pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";

/// Spacing between `getTransaction` calls; public RPC nodes throttle bursts.
const TX_FETCH_PACING: Duration = Duration::from_millis(100);

/// SPL mints reported as balances: (mint, symbol, name). Anything else is ignored.
const KNOWN_MINTS: &[(&str, &str, &str)] = &[
    ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", "USD Coin"),
    ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT", "Tether"),
    ("So11111111111111111111111111111111111111112", "wSOL", "Wrapped SOL"),
    ("7vfCXTUXx5WJV5JADk17DUJ4ksgau7utNKj4b963voxs", "ETH", "Ethereum (Wormhole)"),
    ("mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", "mSOL", "Marinade Staked SOL"),
    ("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK", "Bonk"),
    ("J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn", "JitoSOL", "Jito Staked SOL"),
    ("jupSoLaHXQiZZTSfEWMTRRgpnyFm8f6sZdosWBjx93v", "JupSOL", "Jupiter Staked SOL"),
    ("HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3", "PYTH", "Pyth Network"),
    ("jup6126qz4u4as4Kz8Y8CyYbnY6u9C5HYvFNhzwDqKi", "JUP", "Jupiter"),
];

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// 32–44 characters from the base58 alphabet.
pub fn is_valid_solana_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// (symbol, name) for an allow-listed mint.
pub fn known_mint(mint: &str) -> Option<(&'static str, &'static str)> {
    KNOWN_MINTS
        .iter()
        .find(|(m, _, _)| *m == mint)
        .map(|(_, symbol, name)| (*symbol, *name))
}

/// Balances from a jsonParsed `getTokenAccountsByOwner` result.
/// Unknown mints and empty accounts are dropped.
pub fn parse_token_accounts(result: &Value) -> Vec<AssetBalance> {
    let Some(accounts) = result.get("value").and_then(Value::as_array) else {
        return Vec::new();
    };

    accounts
        .iter()
        .filter_map(|acc| {
            let info = acc.pointer("/account/data/parsed/info")?;
            let mint = info.get("mint")?.as_str()?;
            let amount = info.pointer("/tokenAmount/uiAmount")?.as_f64()?;
            if amount <= 0.0 {
                return None;
            }
            let Some((symbol, name)) = known_mint(mint) else {
                debug!(mint, "Ignoring token outside the allow-list");
                return None;
            };
            Some(AssetBalance::named(symbol, amount, name))
        })
        .collect()
}

/// Signature entry from `getSignaturesForAddress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

/// Extract a plain SOL transfer touching `address` from a jsonParsed
/// transaction. Failed transactions, non-transfers and transfers between
/// two other accounts yield `None`.
pub fn parse_system_transfer(address: &str, sig: &SignatureInfo, tx: &Value) -> Option<SourceTransaction> {
    let meta = tx.get("meta")?;
    if meta.get("err").is_some_and(|e| !e.is_null()) {
        return None;
    }

    let instructions = tx.pointer("/transaction/message/instructions")?.as_array()?;
    let info = instructions.iter().find_map(|inst| {
        let program = inst.get("programId")?.as_str()?;
        let kind = inst.pointer("/parsed/type")?.as_str()?;
        (program == SYSTEM_PROGRAM && kind == "transfer").then(|| inst.pointer("/parsed/info"))?
    })?;

    let source = info.get("source")?.as_str()?;
    let destination = info.get("destination")?.as_str()?;
    let lamports = info.get("lamports")?.as_u64()?;

    let tx_type = if source == address {
        TransactionType::Sent
    } else if destination == address {
        TransactionType::Received
    } else {
        return None;
    };

    let block_time = sig.block_time.or_else(|| tx.get("blockTime")?.as_i64())?;

    Some(SourceTransaction {
        tx_type,
        asset: TransactionAsset::new("SOL", "Solana", lamports as f64 / LAMPORTS_PER_SOL),
        value: 0.0,
        tx_hash: Some(sig.signature.clone()),
        timestamp: DateTime::from_timestamp(block_time, 0)?,
        status: Some(TransactionStatus::Completed),
    })
}

#[derive(Deserialize)]
struct BalanceResult {
    value: u64,
}

/// Solana mainnet wallet reader: native SOL plus allow-listed SPL tokens.
pub struct SolanaWalletSource {
    client: Client,
    rpc_url: String,
}

impl SolanaWalletSource {
    pub fn new(client: Client, config: &SyncConfig) -> Self {
        Self {
            client,
            rpc_url: config.solana_rpc_url.clone(),
        }
    }

    async fn rpc<T: serde::de::DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CoreError> {
        json_rpc(&self.client, &self.rpc_url, PROVIDER, method, params).await
    }
}

#[async_trait]
impl BalanceSource for SolanaWalletSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Wallet
    }

    async fn get_balances(&self, request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError> {
        let address = request.wallet_address()?;
        let mut balances = Vec::new();

        let native: BalanceResult = self
            .rpc("getBalance", json!([address, { "commitment": "confirmed" }]))
            .await?;
        let sol = native.value as f64 / LAMPORTS_PER_SOL;
        if sol > 0.0 {
            balances.push(AssetBalance::named("SOL", sol, "Solana"));
        }

        let accounts: Value = self
            .rpc(
                "getTokenAccountsByOwner",
                json!([
                    address,
                    { "programId": SPL_TOKEN_PROGRAM },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;
        balances.extend(parse_token_accounts(&accounts));

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
        // Over-fetch: many signatures are not plain transfers.
        let signatures: Vec<SignatureInfo> = self
            .rpc("getSignaturesForAddress", json!([address, { "limit": limit * 2 }]))
            .await?;

        let mut txs = Vec::new();
        for sig in signatures.iter().filter(|s| s.err.as_ref().map_or(true, Value::is_null)) {
            if txs.len() >= limit {
                break;
            }
            tokio::time::sleep(TX_FETCH_PACING).await;

            let tx: Value = match self
                .rpc(
                    "getTransaction",
                    json!([
                        sig.signature,
                        { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
                    ]),
                )
                .await
            {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(signature = %sig.signature, error = %e, "Skipping unreadable transaction");
                    continue;
                }
            };

            if let Some(parsed) = parse_system_transfer(address, sig, &tx) {
                txs.push(parsed);
            }
        }
        Ok(txs)
    }

    fn validate_address(&self, address: &str) -> Result<(), CoreError> {
        if is_valid_solana_address(address) {
            Ok(())
        } else {
            Err(CoreError::ValidationError(format!(
                "Invalid Solana address '{address}': expected 32-44 base58 characters"
            )))
        }
    }
}
