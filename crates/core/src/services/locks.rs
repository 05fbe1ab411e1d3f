use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per user.
///
/// Every read-modify-write of a user's record or portfolio (sync, hourly
/// snapshot, daily prune, integration edits) holds that user's guard, so a
/// manual sync and a scheduled one can never interleave and lose an update.
/// Different users never contend.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the user's guard. Released on drop.
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Whether someone currently holds the user's guard.
    pub fn is_locked(&self, user_id: Uuid) -> bool {
        self.locks
            .get(&user_id)
            .is_some_and(|m| m.try_lock().is_err())
    }

    /// Forget the mutex of a deleted user.
    pub fn remove(&self, user_id: Uuid) {
        self.locks.remove(&user_id);
    }
}
