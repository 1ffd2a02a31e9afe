use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use pulse_shared::errors::AppResult;
use pulse_shared::types::auth::AuthUser;

use crate::services::presence;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersResponse {
    pub user_ids: Vec<Uuid>,
}

/// GET /presence/online - ids of users with a live presence key.
pub async fn online_users(
    _auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<OnlineUsersResponse>> {
    let user_ids = presence::list_online(&state.redis).await?;
    Ok(Json(OnlineUsersResponse { user_ids }))
}
