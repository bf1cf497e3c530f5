// Token storage abstraction
// One JSON record under a fixed key; backends only differ in where it lives.

pub mod file;
pub mod memory;
pub mod redis_store;

use crate::models::TokenRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Namespace holding the token record
pub const TOKEN_NAMESPACE: &str = "oauth-tokens";

/// Key of the single record inside [`TOKEN_NAMESPACE`]
pub const TOKEN_KEY: &str = "current";

/// Load/save capability for the single token record
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the stored record, if any
    async fn load(&self) -> Result<Option<TokenRecord>, StorageError>;

    /// Replace the stored record unconditionally
    async fn save(&self, record: &TokenRecord) -> Result<(), StorageError>;

    /// Replace the stored record only if it still equals `expected`.
    /// Returns `false` without writing when another writer got there first.
    async fn compare_and_set(
        &self,
        expected: Option<&TokenRecord>,
        record: &TokenRecord,
    ) -> Result<bool, StorageError>;
}

/// Storage errors
#[derive(Debug, Clone)]
pub enum StorageError {
    ConnectionError(String),
    SerializationError(String),
    InvalidData(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Backend selected by the `TOKEN_STORE` setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    File(PathBuf),
    Redis(String),
}

impl std::str::FromStr for StoreBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "memory" {
            Ok(StoreBackend::Memory)
        } else if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(StorageError::InvalidData(
                    "file store needs a path, e.g. file:oauth-tokens.json".to_string(),
                ));
            }
            Ok(StoreBackend::File(PathBuf::from(path)))
        } else if s.starts_with("redis://") || s.starts_with("rediss://") {
            Ok(StoreBackend::Redis(s.to_string()))
        } else {
            Err(StorageError::InvalidData(format!(
                "unknown token store '{}', expected memory, file:<path> or redis://...",
                s
            )))
        }
    }
}

// Redis URLs may embed a password, so only the scheme is shown.
impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::File(path) => write!(f, "file:{}", path.display()),
            StoreBackend::Redis(_) => write!(f, "redis"),
        }
    }
}

/// Factory function to create the token store for a backend
pub async fn create_token_store(
    backend: &StoreBackend,
) -> Result<Arc<dyn TokenStore>, StorageError> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(memory::MemoryTokenStore::new())),
        StoreBackend::File(path) => Ok(Arc::new(file::FileTokenStore::new(path.clone()))),
        StoreBackend::Redis(url) => Ok(Arc::new(redis_store::RedisTokenStore::new(url).await?)),
    }
}
