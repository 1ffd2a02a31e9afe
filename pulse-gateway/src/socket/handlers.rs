use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use socketioxide::extract::{AckSender, SocketRef, TryData};
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult, ErrorCode};
use pulse_shared::types::auth::Principal;

use crate::events::publisher;
use crate::schema::users;
use crate::services::{auth, conversations, messages, presence};
use crate::AppState;

/// Logical room per conversation; every broadcast targets one of these.
pub fn room_for(conversation_id: Uuid) -> String {
    format!("conversation:{conversation_id}")
}

// --- Payloads ---

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationScope {
    conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliveredPayload {
    conversation_id: Uuid,
    message_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadPayload {
    conversation_id: Uuid,
    message_ids: Vec<Uuid>,
}

// --- Replies ---

fn ok_reply() -> serde_json::Value {
    serde_json::json!({ "success": true })
}

fn error_reply(err: &AppError) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": { "code": err.wire_code(), "message": err.to_string() }
    })
}

fn unauthenticated_reply() -> serde_json::Value {
    error_reply(&AppError::new(ErrorCode::Unauthorized, "not authenticated"))
}

fn invalid_payload_reply() -> serde_json::Value {
    error_reply(&AppError::new(ErrorCode::ValidationError, "invalid payload"))
}

/// The authenticated subject attached at handshake. Client-supplied user
/// ids are never trusted; this is the only identity handlers act on.
fn principal(socket: &SocketRef) -> Option<Principal> {
    socket.extensions.get::<Principal>()
}

fn check_member(state: &AppState, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    conversations::ensure_member(&mut conn, conversation_id, user_id)
}

// --- Handshake ---

pub async fn on_connect_with_state(
    socket: SocketRef,
    auth: TryData<AuthPayload>,
    state: Arc<AppState>,
) {
    let token = match extract_token(&socket, auth) {
        Some(token) => token,
        None => {
            tracing::warn!(sid = %socket.id, "socket connected without credential");
            let _ = socket.emit("error", &unauthenticated_reply());
            socket.disconnect().ok();
            return;
        }
    };

    let verified = state
        .db
        .get()
        .map_err(|e| AppError::Internal(e.into()))
        .and_then(|mut conn| auth::verify_credential(&mut conn, &state.config.jwt_secret, &token));

    let principal = match verified {
        Ok(principal) => principal,
        Err(err) => {
            tracing::warn!(sid = %socket.id, error = %err, "socket auth failed");
            let _ = socket.emit("error", &error_reply(&err));
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(principal.clone());
    state.connected.insert(socket.id.to_string(), principal.id);

    if let Err(err) = presence::mark_online(&state.redis, principal.id).await {
        tracing::warn!(user_id = %principal.id, error = %err, "failed to mark presence");
    }

    tracing::info!(user_id = %principal.id, sid = %socket.id, "socket connected");

    let _ = socket.emit("connected", &serde_json::json!({ "userId": principal.id }));

    register_handlers(&socket, state);
}

fn extract_token(socket: &SocketRef, auth: TryData<AuthPayload>) -> Option<String> {
    if let TryData(Ok(payload)) = auth {
        return Some(payload.token);
    }

    // Fallback: ?token=xxx on the handshake request.
    let query = socket.req_parts().uri.query().unwrap_or_default();
    query.split('&').find_map(|pair| {
        let mut split = pair.splitn(2, '=');
        let key = split.next()?;
        let value = split.next()?;
        (key == "token").then(|| value.to_string())
    })
}

fn register_handlers(socket: &SocketRef, state: Arc<AppState>) {
    socket.on("join_conversation", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ConversationScope>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_join(socket, payload, ack, &state).await }
        }
    });

    socket.on("leave_conversation", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ConversationScope>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_leave(socket, payload, ack, &state).await }
        }
    });

    socket.on("send_message", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<messages::SendMessage>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_send_message(socket, payload, ack, &state).await }
        }
    });

    socket.on("typing_start", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ConversationScope>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_typing(socket, payload, ack, &state, "user_typing").await }
        }
    });

    socket.on("typing_stop", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ConversationScope>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_typing(socket, payload, ack, &state, "user_typing_stop").await }
        }
    });

    socket.on("message_delivered", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<DeliveredPayload>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_message_delivered(socket, payload, ack, &state).await }
        }
    });

    socket.on("message_read", {
        let state = state.clone();
        move |socket: SocketRef, TryData::<ReadPayload>(payload), ack: AckSender| {
            let state = state.clone();
            async move { on_message_read(socket, payload, ack, &state).await }
        }
    });

    socket.on("heartbeat", {
        let state = state.clone();
        move |socket: SocketRef, ack: AckSender| {
            let state = state.clone();
            async move { on_heartbeat(socket, ack, &state).await }
        }
    });

    socket.on("ping", |ack: AckSender| async move {
        let _ = ack.send(&serde_json::json!({
            "event": "pong",
            "timestamp": Utc::now().timestamp_millis(),
        }));
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move { on_disconnect_with_state(socket, state).await }
        }
    });
}

// --- Rooms ---

async fn on_join(
    socket: SocketRef,
    payload: Result<ConversationScope, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    if let Err(err) = check_member(state, payload.conversation_id, principal.id) {
        let _ = ack.send(&error_reply(&err));
        return;
    }

    socket.join(room_for(payload.conversation_id)).ok();
    tracing::debug!(user_id = %principal.id, conversation_id = %payload.conversation_id, "joined room");
    let _ = ack.send(&serde_json::json!({
        "success": true,
        "conversationId": payload.conversation_id,
    }));
}

async fn on_leave(
    socket: SocketRef,
    payload: Result<ConversationScope, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    if let Err(err) = check_member(state, payload.conversation_id, principal.id) {
        let _ = ack.send(&error_reply(&err));
        return;
    }

    socket.leave(room_for(payload.conversation_id)).ok();
    let _ = ack.send(&serde_json::json!({
        "success": true,
        "conversationId": payload.conversation_id,
    }));
}

// --- Messaging ---

/// Persist, publish, ack. Fan-out to recipients rides the bus so the send
/// path is identical whether recipients share this instance or not.
async fn on_send_message(
    socket: SocketRef,
    payload: Result<messages::SendMessage, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    let sent = state
        .db
        .get()
        .map_err(|e| AppError::Internal(e.into()))
        .and_then(|mut conn| messages::send(&mut conn, principal.id, &payload));

    let view = match sent {
        Ok(view) => view,
        Err(err) => {
            tracing::warn!(user_id = %principal.id, error = %err, "send_message failed");
            let _ = ack.send(&error_reply(&err));
            return;
        }
    };

    publisher::publish_message_created(&state.redis, view.id, view.conversation_id, view.sender_id)
        .await;

    let _ = ack.send(&serde_json::json!({
        "success": true,
        "messageId": view.id,
    }));
}

// --- Typing indicators ---

/// Ephemeral and instance-local: broadcast to the room excluding the
/// sender, never persisted, never published on the bus.
async fn on_typing(
    socket: SocketRef,
    payload: Result<ConversationScope, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
    event: &'static str,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    if let Err(err) = check_member(state, payload.conversation_id, principal.id) {
        let _ = ack.send(&error_reply(&err));
        return;
    }

    let _ = socket.to(room_for(payload.conversation_id)).emit(
        event,
        &serde_json::json!({
            "conversationId": payload.conversation_id,
            "userId": principal.id,
        }),
    );
    let _ = ack.send(&ok_reply());
}

// --- Receipts ---

async fn on_message_delivered(
    socket: SocketRef,
    payload: Result<DeliveredPayload, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    let result = state
        .db
        .get()
        .map_err(|e| AppError::Internal(e.into()))
        .and_then(|mut conn| {
            messages::mark_delivered(
                &mut conn,
                principal.id,
                payload.conversation_id,
                payload.message_id,
            )
        });

    match result {
        Ok(Some(delivered_at)) => {
            let _ = state.io.to(room_for(payload.conversation_id)).emit(
                "message_delivered",
                &serde_json::json!({
                    "conversationId": payload.conversation_id,
                    "messageId": payload.message_id,
                    "userId": principal.id,
                    "deliveredAt": delivered_at,
                }),
            );
            let _ = ack.send(&ok_reply());
        }
        // Already delivered: idempotent no-op, nothing to broadcast.
        Ok(None) => {
            let _ = ack.send(&ok_reply());
        }
        Err(err) => {
            let _ = ack.send(&error_reply(&err));
        }
    }
}

async fn on_message_read(
    socket: SocketRef,
    payload: Result<ReadPayload, serde_json::Error>,
    ack: AckSender,
    state: &Arc<AppState>,
) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };
    let Ok(payload) = payload else {
        let _ = ack.send(&invalid_payload_reply());
        return;
    };

    let result = state
        .db
        .get()
        .map_err(|e| AppError::Internal(e.into()))
        .and_then(|mut conn| {
            messages::mark_read(
                &mut conn,
                principal.id,
                payload.conversation_id,
                &payload.message_ids,
            )
        });

    match result {
        Ok((read_ids, read_at)) => {
            if !read_ids.is_empty() {
                let _ = state.io.to(room_for(payload.conversation_id)).emit(
                    "message_read",
                    &serde_json::json!({
                        "conversationId": payload.conversation_id,
                        "messageIds": read_ids,
                        "userId": principal.id,
                        "readAt": read_at,
                    }),
                );
            }
            let _ = ack.send(&serde_json::json!({
                "success": true,
                "messageIds": read_ids,
            }));
        }
        Err(err) => {
            let _ = ack.send(&error_reply(&err));
        }
    }
}

// --- Liveness ---

async fn on_heartbeat(socket: SocketRef, ack: AckSender, state: &Arc<AppState>) {
    let Some(principal) = principal(&socket) else {
        let _ = ack.send(&unauthenticated_reply());
        return;
    };

    match presence::heartbeat(&state.redis, principal.id).await {
        Ok(()) => {
            let _ = ack.send(&ok_reply());
        }
        Err(err) => {
            tracing::warn!(user_id = %principal.id, error = %err, "heartbeat failed");
            let _ = ack.send(&error_reply(&err));
        }
    }
}

// --- Disconnect ---

async fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let Some(principal) = principal(&socket) else {
        return;
    };

    state.connected.remove(&socket.id.to_string());

    if let Err(err) = presence::mark_offline(&state.redis, principal.id).await {
        tracing::warn!(user_id = %principal.id, error = %err, "failed to clear presence");
    }

    if let Ok(mut conn) = state.db.get() {
        let _ = diesel::update(users::table.find(principal.id))
            .set(users::last_seen_at.eq(Utc::now()))
            .execute(&mut conn);
    }

    tracing::info!(user_id = %principal.id, sid = %socket.id, "socket disconnected");
}
