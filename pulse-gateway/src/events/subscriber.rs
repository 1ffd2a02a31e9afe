use std::sync::Arc;
use std::time::Duration;

use futures_lite::StreamExt;

use pulse_shared::types::event::{MessageCreated, CHAT_MESSAGES_CHANNEL};

use crate::services::messages;
use crate::socket::handlers::room_for;
use crate::AppState;

/// Subscribe to `chat:messages` and fan each notification out to the local
/// room. Runs for the lifetime of the instance; a dropped subscription is
/// re-established after a short backoff.
pub async fn listen_chat_messages(state: Arc<AppState>) {
    loop {
        match state.redis.open_pubsub(CHAT_MESSAGES_CHANNEL).await {
            Ok(mut pubsub) => {
                tracing::info!(channel = CHAT_MESSAGES_CHANNEL, "subscribed to message bus");
                let mut stream = pubsub.on_message();
                while let Some(msg) = stream.next().await {
                    handle_notification(&state, msg).await;
                }
                tracing::warn!("message bus subscription ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "message bus subscribe failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Errors here never reach clients: log and move on. The store re-read is
/// what guarantees every instance broadcasts identical content.
async fn handle_notification(state: &Arc<AppState>, msg: redis::Msg) {
    let payload: String = match msg.get_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "unreadable bus payload");
            return;
        }
    };

    let event: MessageCreated = match serde_json::from_str(&payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, payload = %payload, "malformed bus payload");
            return;
        }
    };

    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(error = %e, "no database connection for bus re-read");
            return;
        }
    };

    match messages::get_view(&mut conn, event.message_id) {
        Ok(Some(view)) => {
            let room = room_for(event.conversation_id);
            let _ = state.io.to(room).emit("message_received", &view);
            tracing::debug!(
                message_id = %event.message_id,
                conversation_id = %event.conversation_id,
                "message fanned out"
            );
        }
        Ok(None) => {
            tracing::warn!(
                message_id = %event.message_id,
                "bus referenced a missing message, dropping"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, message_id = %event.message_id, "bus re-read failed");
        }
    }
}
