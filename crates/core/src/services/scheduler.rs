use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, NaiveTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::errors::CoreError;
use crate::services::aggregation_service::AggregationService;
use crate::services::history_service::HistoryService;
use crate::services::locks::UserLocks;
use crate::services::transaction_service::TransactionService;
use crate::storage::store::DocumentStore;

/// Time from `now` until the top of the next hour.
pub fn duration_until_next_hour(now: DateTime<Utc>) -> Duration {
    let floor = now
        .duration_trunc(ChronoDuration::hours(1))
        .unwrap_or(now);
    let next = floor + ChronoDuration::hours(1);
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Time from `now` until the next `hour:00` UTC. At exactly `hour:00` the
/// answer is one day, not zero.
pub fn duration_until_next_daily(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Next firing slot and the wait until it.
///
/// Slots are counted from the previous target rather than from `now`, so a
/// sleep that returns slightly before the wall-clock boundary cannot fire
/// the same slot twice.
pub fn next_slot(
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
    until: impl Fn(DateTime<Utc>) -> Duration,
) -> (DateTime<Utc>, Duration) {
    let from = previous.map_or(now, |p| p.max(now));
    let step = ChronoDuration::from_std(until(from)).unwrap_or(ChronoDuration::zero());
    let target = from + step;
    (target, (target - now).to_std().unwrap_or(Duration::ZERO))
}

/// Outcome of one auto-sync pass over every user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoSyncSummary {
    pub users: usize,
    pub synced: usize,
    /// Synced, but at least one integration failed
    pub partial: usize,
    pub failed: usize,
}

/// The three background jobs: auto-sync every interval, an hourly value
/// snapshot, and a daily history cleanup.
///
/// The jobs share the store but are not coordinated with each other; every
/// per-user write goes through [`UserLocks`], so overlapping runs serialise
/// per user instead of racing.
pub struct Scheduler {
    aggregation: Arc<AggregationService>,
    transactions: Arc<TransactionService>,
    store: Arc<dyn DocumentStore>,
    locks: Arc<UserLocks>,
    history: HistoryService,
    auto_sync_interval: Duration,
    cleanup_hour_utc: u32,
}

impl Scheduler {
    pub fn new(
        aggregation: Arc<AggregationService>,
        transactions: Arc<TransactionService>,
        store: Arc<dyn DocumentStore>,
        locks: Arc<UserLocks>,
        history: HistoryService,
        auto_sync_interval: Duration,
        cleanup_hour_utc: u32,
    ) -> Self {
        Self {
            aggregation,
            transactions,
            store,
            locks,
            history,
            auto_sync_interval,
            cleanup_hour_utc,
        }
    }

    // ── Jobs ────────────────────────────────────────────────────────

    /// Sync every user that has integrations, then ingest their wallet
    /// transactions. Each user is isolated from the others' failures.
    pub async fn run_auto_sync(&self) -> Result<AutoSyncSummary, CoreError> {
        let users = self.store.users_with_integrations().await?;
        let mut summary = AutoSyncSummary {
            users: users.len(),
            ..Default::default()
        };

        for user_id in users {
            match self.aggregation.sync_portfolio(user_id).await {
                Ok(report) => {
                    summary.synced += 1;
                    if report.is_partial() {
                        summary.partial += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(%user_id, error = %e, "Auto-sync failed for user");
                    continue;
                }
            }

            if let Err(e) = self.transactions.sync_user_wallets(user_id).await {
                warn!(%user_id, error = %e, "Wallet transaction ingestion failed");
            }
        }

        info!(
            users = summary.users,
            synced = summary.synced,
            partial = summary.partial,
            failed = summary.failed,
            "Auto-sync complete"
        );
        Ok(summary)
    }

    /// Append a history point to every portfolio worth more than zero.
    /// Returns how many points were appended.
    pub async fn run_hourly_snapshot(&self) -> Result<usize, CoreError> {
        let now = Utc::now();
        let mut appended = 0;

        for user_id in self.store.portfolio_owners().await? {
            let _guard = self.locks.lock(user_id).await;
            let Some(mut portfolio) = self.store.get_portfolio(user_id).await? else {
                continue;
            };
            if portfolio.total_value <= 0.0 {
                continue;
            }

            self.history.record_snapshot(&mut portfolio, now);
            match self.store.save_portfolio(&portfolio).await {
                Ok(_) => appended += 1,
                Err(e) => warn!(%user_id, error = %e, "Snapshot not saved"),
            }
        }

        info!(appended, "Hourly snapshot complete");
        Ok(appended)
    }

    /// Prune history older than the retention window on every portfolio.
    /// Returns how many points were removed.
    pub async fn run_history_cleanup(&self) -> Result<usize, CoreError> {
        let now = Utc::now();
        let mut removed = 0;

        for user_id in self.store.portfolio_owners().await? {
            let _guard = self.locks.lock(user_id).await;
            let Some(mut portfolio) = self.store.get_portfolio(user_id).await? else {
                continue;
            };

            let pruned = self.history.prune(&mut portfolio.performance_history, now);
            if pruned == 0 {
                continue;
            }
            match self.store.save_portfolio(&portfolio).await {
                Ok(_) => removed += pruned,
                Err(e) => warn!(%user_id, error = %e, "Pruned history not saved"),
            }
        }

        info!(removed, "History cleanup complete");
        Ok(removed)
    }

    // ── Background loop ─────────────────────────────────────────────

    /// Spawn the three jobs on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let auto_sync = {
            let scheduler = Arc::clone(&self);
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = interval(scheduler.auto_sync_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately; the first sync runs one interval in.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = scheduler.run_auto_sync().await {
                                error!(error = %e, "Auto-sync pass failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Auto-sync task stopped");
            })
        };

        let snapshot = {
            let scheduler = Arc::clone(&self);
            let mut shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                let mut previous = None;
                loop {
                    let (target, wait) = next_slot(Utc::now(), previous, duration_until_next_hour);
                    previous = Some(target);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            if let Err(e) = scheduler.run_hourly_snapshot().await {
                                error!(error = %e, "Hourly snapshot failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Snapshot task stopped");
            })
        };

        let cleanup = {
            let scheduler = Arc::clone(&self);
            let mut shutdown = shutdown_rx;
            tokio::spawn(async move {
                let hour = scheduler.cleanup_hour_utc;
                let mut previous = None;
                loop {
                    let (target, wait) = next_slot(Utc::now(), previous, |from| {
                        duration_until_next_daily(from, hour)
                    });
                    previous = Some(target);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            if let Err(e) = scheduler.run_history_cleanup().await {
                                error!(error = %e, "History cleanup failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Cleanup task stopped");
            })
        };

        info!(
            auto_sync_secs = self.auto_sync_interval.as_secs(),
            cleanup_hour_utc = self.cleanup_hour_utc,
            "Scheduler started"
        );

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks: vec![auto_sync, snapshot, cleanup],
        }
    }
}

/// Running scheduler. A job already in progress finishes before its task exits.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every task and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        info!("Scheduler stopped");
    }
}
