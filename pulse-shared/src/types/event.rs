use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single pub/sub channel every gateway instance subscribes to.
pub const CHAT_MESSAGES_CHANNEL: &str = "chat:messages";

/// Bus payload published after a message commit. A reference tuple, never
/// the message itself; consumers re-read from the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_payload_wire_shape() {
        let payload = MessageCreated {
            message_id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            sender_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("messageId").is_some());
        assert!(json.get("conversationId").is_some());
        assert!(json.get("senderId").is_some());
    }
}
