use uuid::Uuid;

use pulse_shared::clients::redis::RedisClient;
use pulse_shared::types::event::{MessageCreated, CHAT_MESSAGES_CHANNEL};

/// Publish the reference tuple for a committed message. Fire-and-forget:
/// the message is durable either way, and a lost notification is at worst a
/// lost broadcast the client recovers on the next history load.
pub async fn publish_message_created(
    redis: &RedisClient,
    message_id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
) {
    let payload = MessageCreated {
        message_id,
        conversation_id,
        sender_id,
    };

    let json = match serde_json::to_string(&payload) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize bus payload");
            return;
        }
    };

    if let Err(e) = redis.publish(CHAT_MESSAGES_CHANNEL, &json).await {
        tracing::error!(error = %e, message_id = %message_id, "failed to publish message event");
    } else {
        tracing::debug!(
            message_id = %message_id,
            conversation_id = %conversation_id,
            "message event published"
        );
    }
}
