use uuid::Uuid;

use pulse_shared::clients::redis::RedisClient;
use pulse_shared::errors::AppResult;

/// Presence keys expire on their own, so a crashed instance strands nobody
/// as permanently online.
pub const PRESENCE_TTL_SECS: u64 = 60;

pub fn online_key(user_id: Uuid) -> String {
    format!("user:{user_id}:online")
}

/// Parse the user id back out of a presence key.
pub fn user_id_from_key(key: &str) -> Option<Uuid> {
    key.strip_prefix("user:")
        .and_then(|rest| rest.strip_suffix(":online"))
        .and_then(|id| Uuid::parse_str(id).ok())
}

pub async fn mark_online(redis: &RedisClient, user_id: Uuid) -> AppResult<()> {
    redis
        .set_ex(&online_key(user_id), "1", PRESENCE_TTL_SECS)
        .await?;
    Ok(())
}

/// Refresh the TTL in place. A key that already expired (late heartbeat) is
/// recreated, since the heartbeat proves the connection is alive.
pub async fn heartbeat(redis: &RedisClient, user_id: Uuid) -> AppResult<()> {
    let key = online_key(user_id);
    let refreshed = redis.expire(&key, PRESENCE_TTL_SECS as i64).await?;
    if !refreshed {
        redis.set_ex(&key, "1", PRESENCE_TTL_SECS).await?;
    }
    Ok(())
}

pub async fn mark_offline(redis: &RedisClient, user_id: Uuid) -> AppResult<()> {
    redis.del(&online_key(user_id)).await?;
    Ok(())
}

pub async fn is_online(redis: &RedisClient, user_id: Uuid) -> AppResult<bool> {
    Ok(redis.exists(&online_key(user_id)).await?)
}

pub async fn list_online(redis: &RedisClient) -> AppResult<Vec<Uuid>> {
    let keys = redis.scan_match("user:*:online").await?;
    Ok(keys.iter().filter_map(|k| user_id_from_key(k)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrip() {
        let id = Uuid::new_v4();
        let key = online_key(id);
        assert_eq!(key, format!("user:{id}:online"));
        assert_eq!(user_id_from_key(&key), Some(id));
    }

    #[test]
    fn malformed_keys_rejected() {
        assert_eq!(user_id_from_key("user:not-a-uuid:online"), None);
        assert_eq!(user_id_from_key("session:abc:online"), None);
        assert_eq!(user_id_from_key("user:abc"), None);
    }
}
