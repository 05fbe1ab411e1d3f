use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;
use crate::models::transaction::{Transaction, TransactionKey};
use crate::models::user::User;

/// Document-store abstraction over User, Portfolio and Transaction records.
///
/// The sync core only depends on this trait; the backing technology is the
/// host's choice. Implementations must index transactions by
/// `(user_id, tx_hash, type, integration_id)` for dedup lookups and by
/// `(user_id, timestamp desc)` for recency queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, CoreError>;

    /// Insert or replace a user record.
    async fn save_user(&self, user: &User) -> Result<(), CoreError>;

    /// Ids of every user that has at least one integration.
    async fn users_with_integrations(&self) -> Result<Vec<Uuid>, CoreError>;

    /// Delete a user and cascade to their portfolio and transactions.
    /// Returns false when the user did not exist.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, CoreError>;

    // ── Portfolios ──────────────────────────────────────────────────

    async fn get_portfolio(&self, user_id: Uuid) -> Result<Option<Portfolio>, CoreError>;

    /// Persist a portfolio if its `version` still matches the stored one
    /// (0 for a portfolio that was never saved). Returns the saved document
    /// with its bumped version, or `CoreError::PortfolioConflict`.
    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<Portfolio, CoreError>;

    /// Ids of every stored portfolio.
    async fn portfolio_owners(&self) -> Result<Vec<Uuid>, CoreError>;

    // ── Transactions ────────────────────────────────────────────────

    async fn transaction_exists(&self, key: &TransactionKey) -> Result<bool, CoreError>;

    /// Insert unless a transaction with the same key exists.
    /// Returns whether a row was written.
    async fn insert_transaction(&self, transaction: &Transaction) -> Result<bool, CoreError>;

    /// Newest-first by event timestamp.
    async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError>;

    async fn count_transactions(&self, user_id: Uuid) -> Result<usize, CoreError>;

    /// Cascade for integration removal. Returns the number of rows deleted.
    async fn delete_transactions_for_integration(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
    ) -> Result<usize, CoreError>;
}
