// ═══════════════════════════════════════════════════════════════════
// Service Tests: merging, valuation, history policy, per-user locks,
// transaction ingestion, scheduler timing
// ═══════════════════════════════════════════════════════════════════

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use uuid::Uuid;

use portfolio_sync_core::errors::CoreError;
use portfolio_sync_core::models::asset::{AssetBalance, Holding, SourceContribution};
use portfolio_sync_core::models::integration::{EncryptedCredentials, Integration, IntegrationKind};
use portfolio_sync_core::models::performance::Timeframe;
use portfolio_sync_core::models::portfolio::{HistoryPoint, Portfolio};
use portfolio_sync_core::models::price::{PriceMap, PriceQuote};
use portfolio_sync_core::models::transaction::{
    SourceTransaction, TransactionAsset, TransactionStatus, TransactionType,
};
use portfolio_sync_core::models::user::User;
use portfolio_sync_core::providers::registry::SourceRegistry;
use portfolio_sync_core::providers::traits::{BalanceRequest, BalanceSource, PriceOracle};
use portfolio_sync_core::services::aggregation_service::{merge_balances, SourceBalances};
use portfolio_sync_core::services::history_service::HistoryService;
use portfolio_sync_core::services::locks::UserLocks;
use portfolio_sync_core::services::scheduler::{
    duration_until_next_daily, duration_until_next_hour, next_slot,
};
use portfolio_sync_core::services::transaction_service::TransactionService;
use portfolio_sync_core::services::valuation_service::ValuationService;
use portfolio_sync_core::storage::memory::MemoryStore;
use portfolio_sync_core::storage::store::DocumentStore;

const WALLET: &str = "0x1111111111111111111111111111111111111111";

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ═══════════════════════════════════════════════════════════════════
// Fakes
// ═══════════════════════════════════════════════════════════════════

/// Oracle that only knows names; prices are handed to the valuation directly.
struct NamingOracle;

#[async_trait]
impl PriceOracle for NamingOracle {
    fn name(&self) -> &str {
        "Naming"
    }

    async fn get_prices(&self, _symbols: &HashSet<String>) -> PriceMap {
        PriceMap::new()
    }

    fn asset_name(&self, symbol: &str) -> Option<String> {
        (symbol == "BTC").then(|| "Bitcoin".to_string())
    }
}

/// Wallet source replaying a fixed transaction feed.
struct FeedWallet {
    feed: Vec<SourceTransaction>,
}

#[async_trait]
impl BalanceSource for FeedWallet {
    fn name(&self) -> &str {
        "MetaMask"
    }

    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Wallet
    }

    async fn get_balances(&self, _request: &BalanceRequest) -> Result<Vec<AssetBalance>, CoreError> {
        Ok(Vec::new())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn get_recent_transactions(
        &self,
        _address: &str,
        limit: usize,
    ) -> Result<Vec<SourceTransaction>, CoreError> {
        Ok(self.feed.iter().take(limit).cloned().collect())
    }
}

fn source_tx(hash: &str, tx_type: TransactionType, amount: f64, ts: i64) -> SourceTransaction {
    SourceTransaction {
        tx_type,
        asset: TransactionAsset::new("ETH", "Ethereum", amount),
        value: 0.0,
        tx_hash: Some(hash.to_string()),
        timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
        status: None,
    }
}

fn holding(symbol: &str, amount: f64, name: Option<&str>) -> Holding {
    Holding {
        symbol: symbol.into(),
        name: name.map(str::to_string),
        amount,
        sources: vec![SourceContribution {
            provider_name: "Binance".into(),
            kind: IntegrationKind::Exchange,
            amount,
        }],
    }
}

// ═══════════════════════════════════════════════════════════════════
// Merging
// ═══════════════════════════════════════════════════════════════════

mod merging {
    use super::*;

    fn source(provider: &str, kind: IntegrationKind, balances: Vec<AssetBalance>) -> SourceBalances {
        SourceBalances {
            provider_name: provider.into(),
            kind,
            balances,
        }
    }

    #[test]
    fn sums_by_symbol_in_first_seen_order() {
        let merged = merge_balances(&[
            source(
                "Binance",
                IntegrationKind::Exchange,
                vec![AssetBalance::new("BTC", 0.1), AssetBalance::new("ETH", 1.0)],
            ),
            source(
                "MetaMask",
                IntegrationKind::Wallet,
                vec![AssetBalance::named("ETH", 0.5, "Ethereum"), AssetBalance::new("LINK", 3.0)],
            ),
        ]);

        let symbols: Vec<&str> = merged.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "ETH", "LINK"]);

        let eth = &merged[1];
        assert!(approx(eth.amount, 1.5));
        assert_eq!(eth.name.as_deref(), Some("Ethereum"));
        let contributors: Vec<&str> = eth.sources.iter().map(|s| s.provider_name.as_str()).collect();
        assert_eq!(contributors, ["Binance", "MetaMask"]);
        assert_eq!(eth.sources[1].kind, IntegrationKind::Wallet);
        assert!(approx(eth.sources[1].amount, 0.5));
    }

    #[test]
    fn symbols_merge_case_insensitively() {
        let mut lower = AssetBalance::new("eth", 1.0);
        lower.symbol = "eth".into();
        let merged = merge_balances(&[
            source("A", IntegrationKind::Exchange, vec![AssetBalance::new("ETH", 1.0)]),
            source("B", IntegrationKind::Exchange, vec![lower]),
        ]);
        assert_eq!(merged.len(), 1);
        assert!(approx(merged[0].amount, 2.0));
    }

    #[test]
    fn non_positive_amounts_are_skipped() {
        let merged = merge_balances(&[source(
            "A",
            IntegrationKind::Exchange,
            vec![
                AssetBalance::new("BTC", 0.0),
                AssetBalance::new("ETH", -1.0),
                AssetBalance::new("SOL", f64::NAN),
                AssetBalance::new("ADA", 10.0),
            ],
        )]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].symbol, "ADA");
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert!(merge_balances(&[]).is_empty());
        assert!(merge_balances(&[source("A", IntegrationKind::Wallet, vec![])]).is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Valuation
// ═══════════════════════════════════════════════════════════════════

mod valuation {
    use super::*;

    #[test]
    fn value_and_daily_pnl() {
        let service = ValuationService::new();
        let mut prices = PriceMap::new();
        prices.insert("BTC".into(), PriceQuote::new(100.0, 25.0));

        let assets = service.value_holdings(
            vec![holding("BTC", 2.0, None)],
            &prices,
            &NamingOracle,
            Utc::now(),
        );

        let btc = &assets[0];
        assert!(approx(btc.total_value, 200.0));
        assert!(approx(btc.current_price, 100.0));
        assert!(approx(service.previous_value(200.0, 25.0), 160.0));
        assert!(approx(btc.pnl_24h, 40.0));
        assert_eq!(btc.source, "Binance");
        assert_eq!(btc.source_type, IntegrationKind::Exchange);
    }

    #[test]
    fn negative_change_gives_loss() {
        let service = ValuationService::new();
        assert!(approx(service.pnl_24h(50.0, -50.0), -50.0));
    }

    #[test]
    fn total_wipeout_has_zero_pnl() {
        let service = ValuationService::new();
        assert!(approx(service.pnl_24h(100.0, -100.0), 0.0));
        assert!(approx(service.pnl_24h(100.0, -150.0), 0.0));
    }

    #[test]
    fn unpriced_symbols_are_kept_at_zero() {
        let service = ValuationService::new();
        let assets = service.value_holdings(
            vec![holding("OBSCURE", 1000.0, None)],
            &PriceMap::new(),
            &NamingOracle,
            Utc::now(),
        );
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].total_value, 0.0);
        assert_eq!(assets[0].change_percent_24h, 0.0);
        assert_eq!(assets[0].pnl_24h, 0.0);
        assert!(approx(assets[0].amount, 1000.0));
    }

    #[test]
    fn name_prefers_source_then_oracle_then_symbol() {
        let service = ValuationService::new();
        let assets = service.value_holdings(
            vec![
                holding("ETH", 1.0, Some("Ether")),
                holding("BTC", 1.0, None),
                holding("XYZ", 1.0, None),
            ],
            &PriceMap::new(),
            &NamingOracle,
            Utc::now(),
        );
        let names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Ether", "Bitcoin", "XYZ"]);
    }

    #[test]
    fn holding_without_contributors_is_dropped() {
        let service = ValuationService::new();
        let orphan = Holding {
            symbol: "BTC".into(),
            name: None,
            amount: 1.0,
            sources: Vec::new(),
        };
        assert!(service
            .value_holdings(vec![orphan], &PriceMap::new(), &NamingOracle, Utc::now())
            .is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// History
// ═══════════════════════════════════════════════════════════════════

mod history {
    use super::*;

    fn point(timestamp: DateTime<Utc>, total_value: f64) -> HistoryPoint {
        HistoryPoint {
            timestamp,
            total_value,
        }
    }

    #[test]
    fn prune_drops_points_past_retention() {
        let service = HistoryService::new(ChronoDuration::days(365));
        let now = Utc::now();
        let mut history = vec![
            point(now - ChronoDuration::days(400), 1.0),
            point(now - ChronoDuration::days(300), 2.0),
            point(now - ChronoDuration::hours(1), 3.0),
        ];

        assert_eq!(service.prune(&mut history, now), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].total_value, 2.0);
    }

    #[test]
    fn point_exactly_at_cutoff_survives() {
        let service = HistoryService::new(ChronoDuration::days(30));
        let now = Utc::now();
        let mut history = vec![point(service.retention_cutoff(now), 1.0)];
        assert_eq!(service.prune(&mut history, now), 0);
    }

    #[test]
    fn oversized_retention_keeps_everything() {
        let service = HistoryService::new(ChronoDuration::days(100_000_000));
        let now = Utc::now();
        assert_eq!(service.retention_cutoff(now), DateTime::<Utc>::MIN_UTC);

        let mut history = vec![point(now - ChronoDuration::days(40_000), 1.0)];
        assert_eq!(service.prune(&mut history, now), 0);
    }

    #[test]
    fn snapshot_appends_current_value() {
        let service = HistoryService::default();
        let now = Utc::now();
        let mut portfolio = Portfolio::new(Uuid::new_v4());
        portfolio.total_value = 1234.5;

        assert!(service.record_snapshot(&mut portfolio, now));
        assert_eq!(portfolio.performance_history.len(), 1);
        assert_eq!(portfolio.performance_history[0].timestamp, now);
        assert_eq!(portfolio.performance_history[0].total_value, 1234.5);
    }

    #[test]
    fn worthless_portfolio_records_nothing_but_still_prunes() {
        let service = HistoryService::new(ChronoDuration::days(365));
        let now = Utc::now();
        let mut portfolio = Portfolio::new(Uuid::new_v4());
        portfolio.performance_history = vec![point(now - ChronoDuration::days(500), 10.0)];

        assert!(!service.record_snapshot(&mut portfolio, now));
        assert!(portfolio.performance_history.is_empty());
    }

    #[test]
    fn series_filters_by_timeframe_and_sorts() {
        let service = HistoryService::default();
        let now = Utc::now();
        let history = vec![
            point(now - ChronoDuration::hours(2), 120.0),
            point(now - ChronoDuration::days(3), 90.0),
            point(now - ChronoDuration::hours(20), 110.0),
            point(now - ChronoDuration::days(60), 50.0),
        ];

        let day = service.series(&history, Timeframe::Day, now);
        assert_eq!(day.values, vec![110.0, 120.0]);
        assert_eq!(day.labels.len(), 2);
        assert!(day.labels[0] < day.labels[1]);

        let week = service.series(&history, Timeframe::Week, now);
        assert_eq!(week.values, vec![90.0, 110.0, 120.0]);

        let all = service.series(&history, Timeframe::All, now);
        assert_eq!(all.len(), 4);
        assert_eq!(all.values[0], 50.0);
    }

    #[test]
    fn empty_history_gives_empty_series() {
        let service = HistoryService::default();
        assert!(service.series(&[], Timeframe::Year, Utc::now()).is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Locks
// ═══════════════════════════════════════════════════════════════════

mod locks {
    use super::*;

    #[tokio::test]
    async fn guard_is_held_until_dropped() {
        let locks = UserLocks::new();
        let user = Uuid::new_v4();
        assert!(!locks.is_locked(user));

        let guard = locks.lock(user).await;
        assert!(locks.is_locked(user));
        drop(guard);
        assert!(!locks.is_locked(user));
    }

    #[tokio::test]
    async fn users_do_not_contend() {
        let locks = UserLocks::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let _a = locks.lock(a).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock(b))
            .await
            .expect("second user should not wait");
        assert!(locks.is_locked(a));
        assert!(locks.is_locked(b));
    }

    #[tokio::test]
    async fn same_user_waits() {
        let locks = Arc::new(UserLocks::new());
        let user = Uuid::new_v4();
        let guard = locks.lock(user).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(user).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn remove_forgets_user() {
        let locks = UserLocks::new();
        let user = Uuid::new_v4();
        drop(locks.lock(user).await);
        locks.remove(user);
        assert!(!locks.is_locked(user));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Transactions
// ═══════════════════════════════════════════════════════════════════

mod transactions {
    use super::*;

    fn service_with(feed: Vec<SourceTransaction>) -> (TransactionService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FeedWallet { feed }));
        let service = TransactionService::new(
            store.clone(),
            Arc::new(registry),
            20,
            Duration::from_secs(5),
        );
        (service, store)
    }

    #[tokio::test]
    async fn ingest_records_new_and_skips_duplicates() {
        let (service, store) = service_with(Vec::new());
        let user = Uuid::new_v4();
        let wallet = Integration::wallet("MetaMask", WALLET);
        let batch = vec![
            source_tx("0xa", TransactionType::Received, 1.0, 1_700_000_000),
            source_tx("0xb", TransactionType::Sent, 0.5, 1_700_000_100),
        ];

        let first = service.ingest(user, &wallet, batch.clone()).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 0);

        let second = service.ingest(user, &wallet, batch).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.count_transactions(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn same_hash_different_direction_is_distinct() {
        let (service, store) = service_with(Vec::new());
        let user = Uuid::new_v4();
        let wallet = Integration::wallet("MetaMask", WALLET);
        let report = service
            .ingest(
                user,
                &wallet,
                vec![
                    source_tx("0xself", TransactionType::Sent, 1.0, 1_700_000_000),
                    source_tx("0xself", TransactionType::Received, 1.0, 1_700_000_000),
                ],
            )
            .await
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(store.count_transactions(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn zero_amounts_are_ignored() {
        let (service, _) = service_with(Vec::new());
        let wallet = Integration::wallet("MetaMask", WALLET);
        let report = service
            .ingest(
                Uuid::new_v4(),
                &wallet,
                vec![source_tx("0xz", TransactionType::Received, 0.0, 1_700_000_000)],
            )
            .await
            .unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(report.inserted, 0);
    }

    #[tokio::test]
    async fn missing_status_defaults_to_completed() {
        let (service, store) = service_with(Vec::new());
        let user = Uuid::new_v4();
        let wallet = Integration::wallet("MetaMask", WALLET);
        service
            .ingest(user, &wallet, vec![source_tx("0xs", TransactionType::Received, 1.0, 1_700_000_000)])
            .await
            .unwrap();

        let stored = store.recent_transactions(user, 10).await.unwrap();
        assert_eq!(stored[0].status, TransactionStatus::Completed);
        assert_eq!(stored[0].source, "MetaMask");
        assert_eq!(stored[0].source_type, IntegrationKind::Wallet);
        assert_eq!(stored[0].integration_id, wallet.id);
        assert_eq!(stored[0].fee, 0.0);
    }

    #[tokio::test]
    async fn wallet_sync_pulls_the_feed() {
        let (service, store) = service_with(vec![
            source_tx("0x1", TransactionType::Received, 1.0, 1_700_000_300),
            source_tx("0x2", TransactionType::Sent, 2.0, 1_700_000_200),
        ]);
        let mut user = User::new("alice");
        let wallet = Integration::wallet("MetaMask", WALLET);
        user.integrations.push(wallet.clone());
        store.save_user(&user).await.unwrap();

        let report = service.sync_wallet_transactions(user.id, &wallet).await.unwrap();
        assert_eq!(report.inserted, 2);

        let again = service.sync_user_wallets(user.id).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 2);

        let recent = service.recent_transactions(user.id, 10).await.unwrap();
        let hashes: Vec<&str> = recent.iter().filter_map(|t| t.tx_hash.as_deref()).collect();
        assert_eq!(hashes, ["0x1", "0x2"]);
    }

    #[tokio::test]
    async fn exchanges_have_no_transaction_feed() {
        let (service, _) = service_with(Vec::new());
        let exchange = Integration::exchange(
            "Binance",
            EncryptedCredentials {
                api_key: "x".into(),
                api_secret: "y".into(),
            },
        );
        let err = service
            .sync_wallet_transactions(Uuid::new_v4(), &exchange)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unregistered_wallet_provider_is_unsupported() {
        let (service, _) = service_with(Vec::new());
        let wallet = Integration::wallet("Ledger", WALLET);
        let err = service
            .sync_wallet_transactions(Uuid::new_v4(), &wallet)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn unknown_user() {
        let (service, _) = service_with(Vec::new());
        let err = service.sync_user_wallets(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::UserNotFound(_)));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Scheduler timing
// ═══════════════════════════════════════════════════════════════════

mod scheduler_timing {
    use super::*;

    #[test]
    fn next_hour_from_mid_hour() {
        let now = at(2024, 3, 10, 14, 45, 30);
        assert_eq!(duration_until_next_hour(now), Duration::from_secs(14 * 60 + 30));
    }

    #[test]
    fn next_hour_on_the_hour_is_a_full_hour() {
        let now = at(2024, 3, 10, 14, 0, 0);
        assert_eq!(duration_until_next_hour(now), Duration::from_secs(3600));
    }

    #[test]
    fn next_daily_later_today() {
        let now = at(2024, 3, 10, 1, 30, 0);
        assert_eq!(duration_until_next_daily(now, 2), Duration::from_secs(30 * 60));
    }

    #[test]
    fn next_daily_already_passed_rolls_to_tomorrow() {
        let now = at(2024, 3, 10, 3, 0, 0);
        assert_eq!(duration_until_next_daily(now, 2), Duration::from_secs(23 * 3600));
    }

    #[test]
    fn next_daily_exactly_at_hour_waits_a_day() {
        let now = at(2024, 3, 10, 2, 0, 0);
        assert_eq!(duration_until_next_daily(now, 2), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn next_daily_crosses_month_end() {
        let now = at(2024, 2, 29, 23, 0, 0);
        assert_eq!(duration_until_next_daily(now, 0), Duration::from_secs(3600));
    }

    #[test]
    fn first_slot_is_counted_from_now() {
        let now = at(2024, 3, 10, 14, 45, 0);
        let (target, wait) = next_slot(now, None, duration_until_next_hour);
        assert_eq!(target, at(2024, 3, 10, 15, 0, 0));
        assert_eq!(wait, Duration::from_secs(15 * 60));
    }

    #[test]
    fn early_wakeup_does_not_repeat_the_slot() {
        let slot = at(2024, 3, 10, 15, 0, 0);
        let woke = slot - ChronoDuration::milliseconds(3);
        let (target, wait) = next_slot(woke, Some(slot), duration_until_next_hour);
        assert_eq!(target, at(2024, 3, 10, 16, 0, 0));
        assert!(wait > Duration::from_secs(3599));
    }

    #[test]
    fn late_wakeup_moves_to_the_following_slot() {
        let slot = at(2024, 3, 10, 15, 0, 0);
        let woke = slot + ChronoDuration::seconds(2);
        let (target, wait) = next_slot(woke, Some(slot), duration_until_next_hour);
        assert_eq!(target, at(2024, 3, 10, 16, 0, 0));
        assert_eq!(wait, Duration::from_secs(3598));
    }

    #[test]
    fn early_daily_wakeup_waits_for_tomorrow() {
        let slot = at(2024, 3, 10, 2, 0, 0);
        let woke = slot - ChronoDuration::milliseconds(5);
        let (target, _) = next_slot(woke, Some(slot), |from| duration_until_next_daily(from, 2));
        assert_eq!(target, at(2024, 3, 11, 2, 0, 0));
    }
}
