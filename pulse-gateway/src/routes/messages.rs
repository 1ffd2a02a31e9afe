use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult};
use pulse_shared::types::auth::AuthUser;
use pulse_shared::types::pagination::CursorParams;

use crate::events::publisher;
use crate::services::messages::{self, MessageDetail, MessageView, SendMessage};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistory {
    pub messages: Vec<MessageView>,
    pub next_cursor: Option<DateTime<Utc>>,
    pub has_more: bool,
}

/// POST /messages - persist and publish, same path as the socket event.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessage>,
) -> AppResult<Json<MessageView>> {
    let view = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        messages::send(&mut conn, auth_user.id, &req)?
    };

    publisher::publish_message_created(&state.redis, view.id, view.conversation_id, view.sender_id)
        .await;

    Ok(Json(view))
}

/// GET /messages/:conversationId?cursor=<iso8601>&limit=<1..100>
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<CursorParams>,
) -> AppResult<Json<MessageHistory>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let page = messages::list_for_conversation(&mut conn, conversation_id, auth_user.id, &params)?;

    Ok(Json(MessageHistory {
        messages: page.items,
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    }))
}

/// GET /messages/single/:messageId - one message with its status rows.
pub async fn get_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<MessageDetail>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let detail = messages::get_single(&mut conn, message_id, auth_user.id)?;
    Ok(Json(detail))
}
