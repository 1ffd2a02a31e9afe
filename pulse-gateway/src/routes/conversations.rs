use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult};
use pulse_shared::types::auth::AuthUser;

use crate::services::conversations::{self, ConversationView, CreateConversation};
use crate::services::presence;
use crate::AppState;

/// POST /conversations - create a direct or group conversation. Direct
/// creation with an existing pair returns the existing conversation.
pub async fn create_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversation>,
) -> AppResult<Json<ConversationView>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let view = conversations::create(&mut conn, auth_user.id, &req)?;

    tracing::info!(
        user_id = %auth_user.id,
        conversation_id = %view.id,
        is_group = view.is_group,
        "conversation created"
    );

    Ok(Json(view))
}

/// GET /conversations - the caller's conversations, most recent first.
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<ConversationView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
    let views = conversations::list_for_user(&mut conn, auth_user.id)?;
    Ok(Json(views))
}

/// GET /conversations/:id - 404 when absent, 403 when not a member.
pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ConversationView>> {
    let mut view = {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        conversations::get(&mut conn, conversation_id, auth_user.id)?
    };

    // Presence is advisory; a store hiccup degrades to "offline".
    for member in &mut view.members {
        member.is_online = presence::is_online(&state.redis, member.user_id)
            .await
            .unwrap_or(false);
    }

    Ok(Json(view))
}
