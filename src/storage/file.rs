// JSON file token store
// The file holds exactly one serialized TokenRecord and is replaced atomically

use super::*;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Token store backed by a single JSON file
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-compare-write sequences within this process
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_record(&self) -> Result<Option<TokenRecord>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ConnectionError(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::SerializationError(format!("Corrupt token file: {}", e)))
    }

    async fn write_record(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::ConnectionError(format!(
                    "Failed to create '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            StorageError::ConnectionError(format!("Failed to write '{}': {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StorageError::ConnectionError(format!(
                "Failed to replace '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Token record written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenRecord>, StorageError> {
        self.read_record().await
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.write_record(record).await
    }

    async fn compare_and_set(
        &self,
        expected: Option<&TokenRecord>,
        record: &TokenRecord,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_record().await?;
        if current.as_ref() != expected {
            return Ok(false);
        }

        self.write_record(record).await?;
        Ok(true)
    }
}
