//! Redis cache store: sync cursor, process locks and the wallet round-robin
//! index.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, instrument};

use crate::domain::{AppError, CacheError, CacheStore};

/// Lua script for guarded lock release: delete only when the stored value is
/// the caller's own token, so a later holder's lock is never removed.
const DELETE_IF_EQUALS: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed cache store over a multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis endpoint.
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        info!("Connecting to Redis...");
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        info!("Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()).into())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| CacheError::Command(e.to_string()).into())
    }

    #[instrument(skip(self, value))]
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut conn = self.connection.clone();
        let written: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(written.is_some())
    }

    #[instrument(skip(self, value))]
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut conn = self.connection.clone();
        let deleted: i64 = redis::Script::new(DELETE_IF_EQUALS)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(deleted > 0)
    }
}
