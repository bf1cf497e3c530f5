// Redis-backed token store
// Lets several relay instances share the record; compare-and-set runs as a Lua script

use super::*;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error};

// Replaces KEYS[1] with ARGV[2] only if it still holds ARGV[1].
// An empty ARGV[1] means "expect no value".
const COMPARE_AND_SET_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if (current == false and ARGV[1] == '') or current == ARGV[1] then
        redis.call('SET', KEYS[1], ARGV[2])
        return 1
    end
    return 0
"#;

/// Redis token store
pub struct RedisTokenStore {
    conn: Mutex<MultiplexedConnection>,
    key: String,
}

impl RedisTokenStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::ConnectionError(format!("Invalid Redis URL: {}", e)))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                StorageError::ConnectionError(e.to_string())
            })?;

        Ok(Self {
            conn: Mutex::new(conn),
            key: record_key(),
        })
    }
}

/// Redis key holding the token record
pub fn record_key() -> String {
    format!("{}:{}", TOKEN_NAMESPACE, TOKEN_KEY)
}

fn encode(record: &TokenRecord) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::SerializationError(e.to_string()))
}

// ARGV[1] for the compare-and-set script
fn expected_arg(expected: Option<&TokenRecord>) -> Result<String, StorageError> {
    match expected {
        Some(expected) => encode(expected),
        None => Ok(String::new()),
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn load(&self) -> Result<Option<TokenRecord>, StorageError> {
        let mut conn = self.conn.lock().await;

        let raw: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| {
                StorageError::SerializationError(format!("Corrupt token record: {}", e))
            })
        })
        .transpose()
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let json = encode(record)?;
        let mut conn = self.conn.lock().await;

        conn.set::<_, _, ()>(&self.key, json)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Token record written to Redis key {}", self.key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        expected: Option<&TokenRecord>,
        record: &TokenRecord,
    ) -> Result<bool, StorageError> {
        let expected = expected_arg(expected)?;
        let json = encode(record)?;
        let mut conn = self.conn.lock().await;

        let swapped = redis::Script::new(COMPARE_AND_SET_SCRIPT)
            .key(&self.key)
            .arg(expected)
            .arg(json)
            .invoke_async::<_, i64>(&mut *conn)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(swapped == 1)
    }
}
