// ═══════════════════════════════════════════════════════════════════
// Provider Tests: registry, exchange signing & simulated routing,
// EVM and Solana parsing, CoinGecko mapping, HTTP retry helpers
// ═══════════════════════════════════════════════════════════════════

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use portfolio_sync_core::config::SyncConfig;
use portfolio_sync_core::errors::CoreError;
use portfolio_sync_core::models::asset::AssetBalance;
use portfolio_sync_core::models::integration::IntegrationKind;
use portfolio_sync_core::models::sync::CredentialCheck;
use portfolio_sync_core::models::transaction::{TransactionStatus, TransactionType};
use portfolio_sync_core::providers::coingecko::{coin_id, coin_name, CoinGeckoOracle};
use portfolio_sync_core::providers::evm::{
    balance_of_calldata, distinct_token_contracts, hex_quantity_to_f64, is_valid_evm_address,
    native_transactions, token_transactions, EvmWalletSource, ExplorerTx, TokenTransfer,
};
use portfolio_sync_core::providers::exchange::{sign_query, ExchangeSource, ExchangeSpec};
use portfolio_sync_core::providers::http::{
    build_client, is_rate_limit_error, parse_amount, with_backoff, RetryPolicy,
};
use portfolio_sync_core::providers::registry::SourceRegistry;
use portfolio_sync_core::providers::simulated::{
    is_sentinel, starter_balances, SimulatedExchange, SENTINEL_API_KEY, SENTINEL_API_SECRET,
};
use portfolio_sync_core::providers::solana::{
    is_valid_solana_address, known_mint, parse_system_transfer, parse_token_accounts,
    SignatureInfo, SYSTEM_PROGRAM,
};
use portfolio_sync_core::providers::traits::{BalanceRequest, BalanceSource, PriceOracle};

/// Nothing listens here; any request that actually goes out fails fast.
const UNREACHABLE: &str = "http://127.0.0.1:9";

const WALLET: &str = "0xAbCdEf0123456789abcdef0123456789ABCDEF01";

fn unreachable_config() -> SyncConfig {
    let mut config = SyncConfig::new("test-secret");
    config.coingecko_base_url = UNREACHABLE.into();
    config.eth_rpc_url = UNREACHABLE.into();
    config.etherscan_base_url = UNREACHABLE.into();
    config.solana_rpc_url = UNREACHABLE.into();
    config.explorer_retry_attempts = 1;
    config
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ═══════════════════════════════════════════════════════════════════
// Mock source
// ═══════════════════════════════════════════════════════════════════

struct MockSource {
    name: &'static str,
    kind: IntegrationKind,
    result: Result<Vec<AssetBalance>, fn() -> CoreError>,
}

#[async_trait]
impl BalanceSource for MockSource {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> IntegrationKind {
        self.kind
    }

    async fn get_balances(&self, _request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError> {
        match &self.result {
            Ok(balances) => Ok(balances.clone()),
            Err(make) => Err(make()),
        }
    }
}

fn mock(name: &'static str, kind: IntegrationKind) -> Arc<MockSource> {
    Arc::new(MockSource {
        name,
        kind,
        result: Ok(vec![AssetBalance::new("BTC", 1.0)]),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════

mod registry {
    use super::*;

    #[test]
    fn empty_registry() {
        let registry = SourceRegistry::new();
        assert!(registry.supported(IntegrationKind::Exchange).is_empty());
        assert!(registry.get(IntegrationKind::Wallet, "MetaMask").is_none());
    }

    #[test]
    fn defaults_register_builtin_sources() {
        let registry = SourceRegistry::new_with_defaults(
            build_client(Duration::from_secs(5)),
            &unreachable_config(),
        );
        assert_eq!(registry.supported(IntegrationKind::Exchange), vec!["MEXC", "Binance"]);
        assert_eq!(registry.supported(IntegrationKind::Wallet), vec!["MetaMask", "Phantom"]);
    }

    #[test]
    fn lookup_is_keyed_on_kind_and_name() {
        let mut registry = SourceRegistry::new();
        registry.register(mock("Alpha", IntegrationKind::Exchange));

        assert!(registry.is_supported(IntegrationKind::Exchange, "Alpha"));
        assert!(!registry.is_supported(IntegrationKind::Wallet, "Alpha"));
        assert!(!registry.is_supported(IntegrationKind::Exchange, "alpha"));
    }

    #[test]
    fn same_name_different_kinds_coexist() {
        let mut registry = SourceRegistry::new();
        registry.register(mock("Dual", IntegrationKind::Exchange));
        registry.register(mock("Dual", IntegrationKind::Wallet));
        assert_eq!(registry.supported(IntegrationKind::Exchange), vec!["Dual"]);
        assert_eq!(registry.supported(IntegrationKind::Wallet), vec!["Dual"]);
    }

    #[tokio::test]
    async fn later_registration_replaces_earlier() {
        let mut registry = SourceRegistry::new();
        registry.register(mock("Alpha", IntegrationKind::Exchange));
        registry.register(Arc::new(MockSource {
            name: "Alpha",
            kind: IntegrationKind::Exchange,
            result: Ok(vec![AssetBalance::new("ETH", 3.0)]),
        }));

        assert_eq!(registry.supported(IntegrationKind::Exchange).len(), 1);
        let source = registry.get(IntegrationKind::Exchange, "Alpha").unwrap();
        let balances = source
            .get_balances(&BalanceRequest::api_key(Uuid::new_v4(), "k", "s"))
            .await
            .unwrap();
        assert_eq!(balances[0].symbol, "ETH");
    }

    #[test]
    fn registries_share_one_simulated_exchange() {
        let registry = SourceRegistry::new();
        let a = registry.simulated();
        let b = registry.simulated();
        a.balances(Uuid::new_v4(), "Binance");
        assert_eq!(b.account_count(), 1);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Source trait defaults
// ═══════════════════════════════════════════════════════════════════

mod trait_defaults {
    use super::*;

    #[tokio::test]
    async fn no_transaction_feed_by_default() {
        let source = mock("Alpha", IntegrationKind::Wallet);
        assert!(!source.supports_transactions());
        assert!(source.get_recent_transactions(WALLET, 10).await.unwrap().is_empty());
        assert!(source.validate_address("anything").is_ok());
    }

    #[tokio::test]
    async fn credential_check_classifies_errors() {
        let request = BalanceRequest::api_key(Uuid::new_v4(), "k", "s");

        let ok = mock("Ok", IntegrationKind::Exchange);
        assert_eq!(ok.validate_credentials(&request).await, CredentialCheck::Valid);

        let rejected = MockSource {
            name: "Rejected",
            kind: IntegrationKind::Exchange,
            result: Err(|| CoreError::Auth {
                provider: "Rejected".into(),
                message: "Invalid API-key".into(),
            }),
        };
        assert!(matches!(
            rejected.validate_credentials(&request).await,
            CredentialCheck::Invalid(_)
        ));

        let down = MockSource {
            name: "Down",
            kind: IntegrationKind::Exchange,
            result: Err(|| CoreError::Network("connection refused".into())),
        };
        assert!(matches!(
            down.validate_credentials(&request).await,
            CredentialCheck::Unavailable(_)
        ));
    }

    #[test]
    fn request_accessors_match_credential_kind() {
        let keyed = BalanceRequest::api_key(Uuid::new_v4(), "key", "secret");
        assert_eq!(keyed.key_pair().unwrap(), ("key", "secret"));
        assert!(matches!(keyed.wallet_address(), Err(CoreError::Credential(_))));

        let wallet = BalanceRequest::address(Uuid::new_v4(), WALLET);
        assert_eq!(wallet.wallet_address().unwrap(), WALLET);
        assert!(matches!(wallet.key_pair(), Err(CoreError::Credential(_))));
    }

    #[test]
    fn request_debug_redacts_keys() {
        let keyed = BalanceRequest::api_key(Uuid::new_v4(), "visible-key", "visible-secret");
        let debug = format!("{:?}", keyed);
        assert!(!debug.contains("visible-key"));
        assert!(!debug.contains("visible-secret"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Exchanges & simulated source
// ═══════════════════════════════════════════════════════════════════

mod exchange {
    use super::*;

    fn unreachable_exchange(spec: ExchangeSpec) -> (ExchangeSource, Arc<SimulatedExchange>) {
        let simulated = Arc::new(SimulatedExchange::new());
        let source = ExchangeSource::new(
            spec.with_base_url(UNREACHABLE),
            build_client(Duration::from_secs(5)),
            simulated.clone(),
        );
        (source, simulated)
    }

    #[test]
    fn hmac_sha256_rfc4231_vector() {
        assert_eq!(
            sign_query("Jefe", "what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_matches_exchange_documentation() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signature_depends_on_timestamp() {
        let a = sign_query("secret", "timestamp=1700000000000").unwrap();
        let b = sign_query("secret", "timestamp=1700000000001").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn specs() {
        let binance = ExchangeSpec::binance();
        assert_eq!(binance.name, "Binance");
        assert_eq!(binance.key_header, "X-MBX-APIKEY");
        let mexc = ExchangeSpec::mexc().with_base_url("http://localhost:8080/");
        assert_eq!(mexc.base_url, "http://localhost:8080");
    }

    #[test]
    fn sentinel_pair() {
        assert!(is_sentinel(SENTINEL_API_KEY, SENTINEL_API_SECRET));
        assert!(!is_sentinel(SENTINEL_API_KEY, "other"));
        assert!(!is_sentinel("other", SENTINEL_API_SECRET));
    }

    #[tokio::test]
    async fn sentinel_credentials_never_reach_the_network() {
        let (source, simulated) = unreachable_exchange(ExchangeSpec::binance());
        let request = BalanceRequest::api_key(Uuid::new_v4(), SENTINEL_API_KEY, SENTINEL_API_SECRET);

        let balances = source.get_balances(&request).await.unwrap();
        assert!(!balances.is_empty());
        let expected: Vec<(&str, f64)> = starter_balances("Binance").to_vec();
        let got: Vec<(&str, f64)> = balances.iter().map(|b| (b.symbol.as_str(), b.amount)).collect();
        assert_eq!(got, expected);
        assert_eq!(simulated.account_count(), 1);
    }

    #[tokio::test]
    async fn sentinel_credentials_validate_offline() {
        let (source, _) = unreachable_exchange(ExchangeSpec::mexc());
        let request = BalanceRequest::api_key(Uuid::new_v4(), SENTINEL_API_KEY, SENTINEL_API_SECRET);
        assert_eq!(source.validate_credentials(&request).await, CredentialCheck::Valid);
    }

    #[tokio::test]
    async fn real_credentials_go_to_the_network() {
        let (source, simulated) = unreachable_exchange(ExchangeSpec::binance());
        let request = BalanceRequest::api_key(Uuid::new_v4(), "real-key", "real-secret");

        let err = source.get_balances(&request).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
        assert_eq!(simulated.account_count(), 0);
        assert!(matches!(
            source.validate_credentials(&request).await,
            CredentialCheck::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn exchange_rejects_address_requests() {
        let (source, _) = unreachable_exchange(ExchangeSpec::binance());
        let err = source
            .get_balances(&BalanceRequest::address(Uuid::new_v4(), WALLET))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Credential(_)));
    }

    #[test]
    fn simulated_accounts_are_stable_per_user_and_provider() {
        let sim = SimulatedExchange::new();
        let user = Uuid::new_v4();
        let first = sim.balances(user, "MEXC");
        let second = sim.balances(user, "MEXC");
        assert_eq!(first, second);
        assert_eq!(sim.account_count(), 1);

        sim.balances(user, "Binance");
        sim.balances(Uuid::new_v4(), "MEXC");
        assert_eq!(sim.account_count(), 3);
    }

    #[test]
    fn unknown_provider_gets_demo_set() {
        let sim = SimulatedExchange::new();
        let balances = sim.balances(Uuid::new_v4(), "SomethingElse");
        assert_eq!(balances.len(), starter_balances("Demo").len());
        assert!(balances.iter().all(|b| b.amount > 0.0));
    }

    #[test]
    fn reset_forgets_accounts() {
        let sim = SimulatedExchange::new();
        sim.balances(Uuid::new_v4(), "MEXC");
        sim.reset();
        assert_eq!(sim.account_count(), 0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// EVM
// ═══════════════════════════════════════════════════════════════════

mod evm {
    use super::*;

    fn transfer(contract: &str, symbol: &str, decimals: &str, value: &str, to: &str, ts: &str) -> TokenTransfer {
        TokenTransfer {
            hash: format!("0xhash-{symbol}-{ts}"),
            from: "0x0000000000000000000000000000000000000001".into(),
            to: to.into(),
            value: value.into(),
            time_stamp: ts.into(),
            contract_address: contract.into(),
            token_name: format!("{symbol} Token"),
            token_symbol: symbol.into(),
            token_decimal: decimals.into(),
        }
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_evm_address(WALLET));
        assert!(is_valid_evm_address("0x0000000000000000000000000000000000000000"));
        assert!(!is_valid_evm_address("0x123"));
        assert!(!is_valid_evm_address("AbCdEf0123456789abcdef0123456789ABCDEF0123"));
        assert!(!is_valid_evm_address("0xZZCdEf0123456789abcdef0123456789ABCDEF01"));
    }

    #[test]
    fn hex_quantities() {
        assert!(approx(hex_quantity_to_f64("0xde0b6b3a7640000", 18).unwrap(), 1.0));
        assert!(approx(hex_quantity_to_f64("0x0", 18).unwrap(), 0.0));
        assert!(approx(hex_quantity_to_f64("0x", 6).unwrap(), 0.0));
        assert!(approx(hex_quantity_to_f64("0xf4240", 6).unwrap(), 1.0));
        assert!(hex_quantity_to_f64("1234", 0).is_err());
        assert!(hex_quantity_to_f64("0xzz", 0).is_err());
    }

    #[test]
    fn balance_of_calldata_layout() {
        let data = balance_of_calldata(WALLET).unwrap();
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.starts_with("0x70a08231000000000000000000000000"));
        assert!(data.ends_with("abcdef0123456789abcdef0123456789abcdef01"));
        assert!(balance_of_calldata("not-an-address").is_err());
    }

    #[test]
    fn distinct_contracts_in_first_seen_order() {
        let transfers = vec![
            transfer("0xAAA", "USDC", "6", "1", WALLET, "3"),
            transfer("0xbbb", "LINK", "18", "1", WALLET, "2"),
            transfer("0xaaa", "USDC", "6", "1", WALLET, "1"),
        ];
        let contracts = distinct_token_contracts(&transfers);
        assert_eq!(contracts.len(), 2);
        assert_eq!(contracts[0].symbol, "USDC");
        assert_eq!(contracts[0].decimals, 6);
        assert_eq!(contracts[1].symbol, "LINK");
    }

    #[test]
    fn native_transaction_direction_and_status() {
        let txs = vec![
            ExplorerTx {
                hash: "0x1".into(),
                from: "0x0000000000000000000000000000000000000002".into(),
                to: WALLET.to_lowercase(),
                value: "1500000000000000000".into(),
                time_stamp: "1700000000".into(),
                is_error: Some("0".into()),
            },
            ExplorerTx {
                hash: "0x2".into(),
                from: WALLET.into(),
                to: "0x0000000000000000000000000000000000000002".into(),
                value: "250000000000000000".into(),
                time_stamp: "1700000100".into(),
                is_error: Some("1".into()),
            },
            ExplorerTx {
                hash: "0x3".into(),
                value: "0".into(),
                time_stamp: "1700000200".into(),
                ..Default::default()
            },
        ];

        let parsed = native_transactions(WALLET, &txs);
        assert_eq!(parsed.len(), 2);

        assert_eq!(parsed[0].tx_type, TransactionType::Received);
        assert!(approx(parsed[0].asset.amount, 1.5));
        assert_eq!(parsed[0].asset.symbol, "ETH");
        assert_eq!(parsed[0].status, Some(TransactionStatus::Completed));
        assert_eq!(parsed[0].timestamp.timestamp(), 1_700_000_000);

        assert_eq!(parsed[1].tx_type, TransactionType::Sent);
        assert!(approx(parsed[1].asset.amount, 0.25));
        assert_eq!(parsed[1].status, Some(TransactionStatus::Failed));
    }

    #[test]
    fn token_transactions_scale_by_decimals() {
        let parsed = token_transactions(
            WALLET,
            &[transfer("0xaaa", "usdc", "6", "2500000", WALLET, "1700000000")],
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].asset.symbol, "USDC");
        assert!(approx(parsed[0].asset.amount, 2.5));
        assert_eq!(parsed[0].tx_type, TransactionType::Received);
    }

    #[test]
    fn explorer_rows_deserialize_from_camel_case() {
        let row: ExplorerTx = serde_json::from_value(json!({
            "hash": "0xabc",
            "from": "0x1",
            "to": "0x2",
            "value": "1",
            "timeStamp": "1700000000",
            "isError": "0",
            "blockNumber": "123"
        }))
        .unwrap();
        assert_eq!(row.time_stamp, "1700000000");
        assert_eq!(row.is_error.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn validate_address_through_source() {
        let source = EvmWalletSource::new(build_client(Duration::from_secs(5)), &unreachable_config());
        assert_eq!(source.name(), "MetaMask");
        assert!(source.supports_transactions());
        assert!(source.validate_address(WALLET).is_ok());
        assert!(matches!(
            source.validate_address("0x123"),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn rpc_outage_fails_the_fetch() {
        let source = EvmWalletSource::new(build_client(Duration::from_secs(5)), &unreachable_config());
        let err = source
            .get_balances(&BalanceRequest::address(Uuid::new_v4(), WALLET))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Solana
// ═══════════════════════════════════════════════════════════════════

mod solana {
    use super::*;

    const OWNER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const OTHER: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

    #[test]
    fn address_validation() {
        assert!(is_valid_solana_address(OWNER));
        assert!(is_valid_solana_address(SYSTEM_PROGRAM));
        assert!(!is_valid_solana_address("short"));
        // 0, O, I and l are not base58
        assert!(!is_valid_solana_address("0WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"));
        assert!(!is_valid_solana_address(WALLET));
    }

    #[test]
    fn known_mints() {
        assert_eq!(
            known_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            Some(("USDC", "USD Coin"))
        );
        assert!(known_mint(OTHER).is_none());
    }

    #[test]
    fn token_accounts_keep_allow_listed_positive_balances() {
        let result = json!({
            "context": { "slot": 1 },
            "value": [
                { "account": { "data": { "parsed": { "info": {
                    "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "tokenAmount": { "uiAmount": 125.5, "decimals": 6 }
                }}}}},
                { "account": { "data": { "parsed": { "info": {
                    "mint": OTHER,
                    "tokenAmount": { "uiAmount": 999.0, "decimals": 6 }
                }}}}},
                { "account": { "data": { "parsed": { "info": {
                    "mint": "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                    "tokenAmount": { "uiAmount": 0.0, "decimals": 5 }
                }}}}}
            ]
        });

        let balances = parse_token_accounts(&result);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].symbol, "USDC");
        assert_eq!(balances[0].name.as_deref(), Some("USD Coin"));
        assert!(approx(balances[0].amount, 125.5));
    }

    #[test]
    fn malformed_token_accounts_yield_nothing() {
        assert!(parse_token_accounts(&json!({})).is_empty());
        assert!(parse_token_accounts(&json!({ "value": [{ "account": {} }] })).is_empty());
    }

    fn transfer_tx(source: &str, destination: &str, lamports: u64, err: serde_json::Value) -> serde_json::Value {
        json!({
            "blockTime": 1_700_000_000,
            "meta": { "err": err },
            "transaction": { "message": { "instructions": [
                { "programId": "ComputeBudget111111111111111111111111111111", "parsed": { "type": "setComputeUnitLimit" } },
                { "programId": SYSTEM_PROGRAM, "parsed": { "type": "transfer", "info": {
                    "source": source, "destination": destination, "lamports": lamports
                }}}
            ]}}
        })
    }

    fn sig(block_time: Option<i64>) -> SignatureInfo {
        SignatureInfo {
            signature: "5sig".into(),
            block_time,
            err: None,
        }
    }

    #[test]
    fn incoming_transfer() {
        let tx = transfer_tx(OTHER, OWNER, 1_500_000_000, serde_json::Value::Null);
        let parsed = parse_system_transfer(OWNER, &sig(Some(1_700_000_500)), &tx).unwrap();
        assert_eq!(parsed.tx_type, TransactionType::Received);
        assert_eq!(parsed.asset.symbol, "SOL");
        assert!(approx(parsed.asset.amount, 1.5));
        assert_eq!(parsed.tx_hash.as_deref(), Some("5sig"));
        assert_eq!(parsed.timestamp.timestamp(), 1_700_000_500);
    }

    #[test]
    fn outgoing_transfer_falls_back_to_tx_block_time() {
        let tx = transfer_tx(OWNER, OTHER, 250_000_000, serde_json::Value::Null);
        let parsed = parse_system_transfer(OWNER, &sig(None), &tx).unwrap();
        assert_eq!(parsed.tx_type, TransactionType::Sent);
        assert!(approx(parsed.asset.amount, 0.25));
        assert_eq!(parsed.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn failed_and_unrelated_transfers_are_skipped() {
        let failed = transfer_tx(OTHER, OWNER, 1, json!({ "InstructionError": [0, "Custom"] }));
        assert!(parse_system_transfer(OWNER, &sig(Some(1)), &failed).is_none());

        let unrelated = transfer_tx(OTHER, SYSTEM_PROGRAM, 1, serde_json::Value::Null);
        assert!(parse_system_transfer(OWNER, &sig(Some(1)), &unrelated).is_none());

        let no_transfer = json!({
            "meta": { "err": null },
            "transaction": { "message": { "instructions": [] } }
        });
        assert!(parse_system_transfer(OWNER, &sig(Some(1)), &no_transfer).is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// CoinGecko
// ═══════════════════════════════════════════════════════════════════

mod coingecko {
    use super::*;

    #[test]
    fn symbol_mapping_is_case_insensitive() {
        assert_eq!(coin_id("BTC"), Some("bitcoin"));
        assert_eq!(coin_id("eth"), Some("ethereum"));
        assert_eq!(coin_id("MATIC"), Some("matic-network"));
        assert_eq!(coin_id("NOPE"), None);
    }

    #[test]
    fn names() {
        assert_eq!(coin_name("SOL"), Some("Solana"));
        assert_eq!(coin_name("usdc"), Some("USD Coin"));
        assert_eq!(coin_name("NOPE"), None);
    }

    #[test]
    fn solana_allow_list_is_priceable() {
        for mint in [
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So",
            "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
        ] {
            let (symbol, _) = known_mint(mint).unwrap();
            assert!(coin_id(symbol).is_some(), "{symbol} has no price mapping");
        }
    }

    #[tokio::test]
    async fn outage_degrades_to_empty_map() {
        let oracle = CoinGeckoOracle::new(build_client(Duration::from_secs(5)), &unreachable_config());
        let symbols: HashSet<String> = ["BTC", "ETH"].iter().map(|s| s.to_string()).collect();
        assert!(oracle.get_prices(&symbols).await.is_empty());
    }

    #[tokio::test]
    async fn unmapped_symbols_make_no_request() {
        let oracle = CoinGeckoOracle::new(build_client(Duration::from_secs(5)), &unreachable_config());
        let symbols: HashSet<String> = ["NOPE".to_string()].into_iter().collect();
        assert!(oracle.get_prices(&symbols).await.is_empty());
        assert_eq!(oracle.asset_name("BTC").as_deref(), Some("Bitcoin"));
        assert_eq!(oracle.name(), "CoinGecko");
    }
}

// ═══════════════════════════════════════════════════════════════════
// HTTP helpers
// ═══════════════════════════════════════════════════════════════════

mod http {
    use super::*;

    #[test]
    fn amounts() {
        assert!(approx(parse_amount("0.00012"), 0.00012));
        assert!(approx(parse_amount(" 42 "), 42.0));
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
    }

    #[test]
    fn backoff_delays_double_and_cap() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(RetryPolicy::none().attempts, 1);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_error(&CoreError::Api {
            provider: "Etherscan".into(),
            message: "Max rate limit reached".into(),
        }));
        assert!(is_rate_limit_error(&CoreError::Network("HTTP 429 Too Many Requests".into())));
        assert!(!is_rate_limit_error(&CoreError::ValidationError("bad".into())));
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let result = with_backoff(RetryPolicy::new(3, Duration::from_millis(1)), "test", || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::Network("reset".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), CoreError> =
            with_backoff(RetryPolicy::new(5, Duration::from_millis(1)), "test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::ValidationError("bad input".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_policy_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), CoreError> =
            with_backoff(RetryPolicy::new(2, Duration::from_millis(1)), "test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::Network("down".into()))
            })
            .await;
        assert!(matches!(result, Err(CoreError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
