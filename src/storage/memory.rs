// In-memory token store
// Used by tests and by deployments that accept re-authorizing after a restart

use super::*;
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory token store
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
        }
    }

    /// Create a store that already holds a record
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenRecord>, StorageError> {
        let record = self
            .record
            .lock()
            .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))?;

        Ok(record.clone())
    }

    async fn save(&self, new_record: &TokenRecord) -> Result<(), StorageError> {
        let mut record = self
            .record
            .lock()
            .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))?;

        *record = Some(new_record.clone());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        expected: Option<&TokenRecord>,
        new_record: &TokenRecord,
    ) -> Result<bool, StorageError> {
        let mut record = self
            .record
            .lock()
            .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))?;

        if record.as_ref() != expected {
            return Ok(false);
        }

        *record = Some(new_record.clone());
        Ok(true)
    }
}
