use std::future::Future;
use std::time::Duration;

use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;

/// Every command is bounded by this deadline so a stalled store surfaces as
/// a dependency failure instead of hanging a handler.
const OP_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: ConnectionManager,
}

async fn bounded<T>(
    fut: impl Future<Output = Result<T, redis::RedisError>>,
) -> Result<T, redis::RedisError> {
    match tokio::time::timeout(OP_DEADLINE, fut).await {
        Ok(res) => res,
        Err(_) => Err(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "operation deadline exceeded",
        ))),
    }
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { client, conn })
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(conn.set_ex(key, value, ttl_secs)).await
    }

    /// Refresh a key's TTL in place. Returns false when the key no longer
    /// exists (already expired), in which case the caller decides whether to
    /// recreate it.
    pub async fn expire(&self, key: &str, ttl_secs: i64) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(conn.expire(key, ttl_secs)).await
    }

    pub async fn del(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(conn.del(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(conn.exists(key)).await
    }

    /// Collect all keys matching a glob pattern via SCAN.
    pub async fn scan_match(&self, pattern: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(async move {
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok(keys)
        })
        .await
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        bounded(conn.publish(channel, payload)).await
    }

    /// Open a dedicated pub/sub connection subscribed to `channel`. Pub/sub
    /// takes over the whole connection, so the subscriber never shares the
    /// command connection above.
    pub async fn open_pubsub(&self, channel: &str) -> Result<PubSub, redis::RedisError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }
}
