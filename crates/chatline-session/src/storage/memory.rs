//! In-memory partner store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use chatline_core::{PartnerStore, StorageError};

/// In-memory partner store.
///
/// Useful for tests and ephemeral sessions. Data is lost on restart.
pub struct MemoryPartnerStore {
    partners: RwLock<HashMap<String, String>>,
}

impl MemoryPartnerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            partners: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPartnerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartnerStore for MemoryPartnerStore {
    async fn load(&self, profile: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .partners
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(profile)
            .cloned())
    }

    async fn save(&self, profile: &str, partner: &str) -> Result<(), StorageError> {
        self.partners
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(profile.to_owned(), partner.to_owned());
        Ok(())
    }

    async fn clear(&self, profile: &str) -> Result<(), StorageError> {
        self.partners
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_clear() {
        let store = MemoryPartnerStore::new();
        assert_eq!(store.load("alice").await.unwrap(), None);

        store.save("alice", "bob").await.unwrap();
        store.save("carol", "dave").await.unwrap();
        assert_eq!(store.load("alice").await.unwrap().as_deref(), Some("bob"));

        store.save("alice", "erin").await.unwrap();
        assert_eq!(store.load("alice").await.unwrap().as_deref(), Some("erin"));

        store.clear("alice").await.unwrap();
        assert_eq!(store.load("alice").await.unwrap(), None);
        assert_eq!(store.load("carol").await.unwrap().as_deref(), Some("dave"));
    }
}
