use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::integration::Integration;

/// The slice of a user record the sync core reads and writes.
/// Authentication and profile fields live with the excluded account layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Linked sources, in creation order
    pub integrations: Vec<Integration>,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            integrations: Vec::new(),
            last_sync: None,
            created_at: Utc::now(),
        }
    }

    pub fn integration(&self, id: Uuid) -> Option<&Integration> {
        self.integrations.iter().find(|i| i.id == id)
    }

    pub fn integration_mut(&mut self, id: Uuid) -> Option<&mut Integration> {
        self.integrations.iter_mut().find(|i| i.id == id)
    }

    /// Active integrations in list order.
    pub fn active_integrations(&self) -> impl Iterator<Item = &Integration> {
        self.integrations.iter().filter(|i| i.is_active)
    }
}
