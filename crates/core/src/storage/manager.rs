use crate::errors::CoreError;

use super::format;
use super::memory::StoreData;

/// Save/load the in-process store to/from a versioned binary snapshot.
///
/// Credentials inside the snapshot are already vault ciphertext, so the
/// snapshot itself is written as-is.
pub struct StorageManager;

impl StorageManager {
    /// Flow: StoreData → bincode → PSNC snapshot bytes
    pub fn save_to_bytes(data: &StoreData) -> Result<Vec<u8>, CoreError> {
        let payload = bincode::serialize(data)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize store: {e}")))?;
        Ok(format::write_snapshot(format::CURRENT_VERSION, &payload))
    }

    /// Flow: PSNC bytes → parse header → bincode → StoreData (indexes rebuilt)
    pub fn load_from_bytes(bytes: &[u8]) -> Result<StoreData, CoreError> {
        let (_header, payload) = format::read_snapshot(bytes)?;
        let mut data: StoreData = bincode::deserialize(payload)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize store: {e}")))?;
        data.rebuild_indexes();
        Ok(data)
    }

    pub fn save_to_file(data: &StoreData, path: &str) -> Result<(), CoreError> {
        let bytes = Self::save_to_bytes(data)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<StoreData, CoreError> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes)
    }
}
