use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult, ErrorCode};
use pulse_shared::types::auth::AuthUser;

use crate::models::{NewUser, User};
use crate::schema::users;
use crate::AppState;

// --- DTOs ---

#[derive(Debug, Deserialize)]
pub struct SyncUserRequest {
    pub id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.display_name,
            image: user.image_url,
            created_at: user.created_at,
            last_seen: user.last_seen_at,
        }
    }
}

// --- Handlers ---

/// POST /auth/sync - upsert the user identified by email. Called by the
/// identity front-door after each login; the row id it gets back is the
/// subject it mints tokens for.
pub async fn sync_user(
    _auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncUserRequest>,
) -> AppResult<Json<SyncResponse>> {
    if req.email.trim().is_empty() || req.name.trim().is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "email and name are required",
        ));
    }

    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            id: req.id,
            email: req.email.clone(),
            display_name: req.name.clone(),
            image_url: req.image.clone(),
        })
        .on_conflict(users::email)
        .do_update()
        .set((
            users::display_name.eq(req.name.clone()),
            users::image_url.eq(req.image.clone()),
        ))
        .get_result(&mut conn)?;

    tracing::debug!(user_id = %user.id, email = %user.email, "user synced");

    Ok(Json(SyncResponse {
        success: true,
        user: user.into(),
    }))
}

/// GET /auth/me - the caller's persisted profile.
pub async fn me(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<UserView>> {
    let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;

    let user: User = users::table
        .find(auth_user.id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    Ok(Json(user.into()))
}
