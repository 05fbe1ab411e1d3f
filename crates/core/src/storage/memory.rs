use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;
use crate::models::transaction::{Transaction, TransactionKey};
use crate::models::user::User;

use super::manager::StorageManager;
use super::store::DocumentStore;

/// Everything the in-process store holds. This is also the payload of a
/// PSNC snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    pub users: HashMap<Uuid, User>,
    pub portfolios: HashMap<Uuid, Portfolio>,
    /// Insertion order
    pub transactions: Vec<Transaction>,
    /// Dedup index over `transactions`, rebuilt after deserialization
    #[serde(skip)]
    tx_keys: HashSet<TransactionKey>,
}

impl StoreData {
    pub fn rebuild_indexes(&mut self) {
        self.tx_keys = self.transactions.iter().map(Transaction::key).collect();
    }
}

/// `DocumentStore` kept entirely in process memory.
///
/// Suitable for tests and single-node deployments; pair it with
/// [`MemoryStore::save_to_file`] / [`MemoryStore::load_from_file`] to survive restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(mut data: StoreData) -> Self {
        data.rebuild_indexes();
        Self {
            data: RwLock::new(data),
        }
    }

    /// Point-in-time copy of the whole store.
    pub async fn snapshot(&self) -> StoreData {
        self.data.read().await.clone()
    }

    pub async fn save_to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let data = self.data.read().await;
        StorageManager::save_to_bytes(&data)
    }

    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::from_data(StorageManager::load_from_bytes(bytes)?))
    }

    pub async fn save_to_file(&self, path: &str) -> Result<(), CoreError> {
        let data = self.data.read().await;
        StorageManager::save_to_file(&data, path)
    }

    pub fn load_from_file(path: &str) -> Result<Self, CoreError> {
        Ok(Self::from_data(StorageManager::load_from_file(path)?))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, CoreError> {
        Ok(self.data.read().await.users.get(&user_id).cloned())
    }

    async fn save_user(&self, user: &User) -> Result<(), CoreError> {
        self.data.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn users_with_integrations(&self) -> Result<Vec<Uuid>, CoreError> {
        let data = self.data.read().await;
        let mut users: Vec<&User> = data
            .users
            .values()
            .filter(|u| !u.integrations.is_empty())
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<bool, CoreError> {
        let mut data = self.data.write().await;
        if data.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        data.portfolios.remove(&user_id);
        data.transactions.retain(|t| t.user_id != user_id);
        data.rebuild_indexes();
        Ok(true)
    }

    async fn get_portfolio(&self, user_id: Uuid) -> Result<Option<Portfolio>, CoreError> {
        Ok(self.data.read().await.portfolios.get(&user_id).cloned())
    }

    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<Portfolio, CoreError> {
        let mut data = self.data.write().await;
        let found = data
            .portfolios
            .get(&portfolio.user_id)
            .map_or(0, |p| p.version);
        if found != portfolio.version {
            return Err(CoreError::PortfolioConflict {
                user_id: portfolio.user_id.to_string(),
                expected: portfolio.version,
                found,
            });
        }

        let mut saved = portfolio.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        data.portfolios.insert(saved.user_id, saved.clone());
        Ok(saved)
    }

    async fn portfolio_owners(&self) -> Result<Vec<Uuid>, CoreError> {
        Ok(self.data.read().await.portfolios.keys().copied().collect())
    }

    async fn transaction_exists(&self, key: &TransactionKey) -> Result<bool, CoreError> {
        Ok(self.data.read().await.tx_keys.contains(key))
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<bool, CoreError> {
        let mut data = self.data.write().await;
        if !data.tx_keys.insert(transaction.key()) {
            return Ok(false);
        }
        data.transactions.push(transaction.clone());
        Ok(true)
    }

    async fn recent_transactions(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Transaction>, CoreError> {
        let data = self.data.read().await;
        let mut txs: Vec<Transaction> = data
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs.truncate(limit);
        Ok(txs)
    }

    async fn count_transactions(&self, user_id: Uuid) -> Result<usize, CoreError> {
        let data = self.data.read().await;
        Ok(data.transactions.iter().filter(|t| t.user_id == user_id).count())
    }

    async fn delete_transactions_for_integration(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
    ) -> Result<usize, CoreError> {
        let mut data = self.data.write().await;
        let before = data.transactions.len();
        data.transactions
            .retain(|t| !(t.user_id == user_id && t.integration_id == integration_id));
        let removed = before - data.transactions.len();
        if removed > 0 {
            data.rebuild_indexes();
        }
        Ok(removed)
    }
}
