use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use pulse_shared::errors::AppResult;
use pulse_shared::types::auth::AuthUser;

use crate::services::media::{self, UploadUrlRequest, UploadUrlResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaUrlQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct MediaUrlResponse {
    pub url: String,
}

/// POST /media/upload-url - authorize an upload and return a presigned PUT.
pub async fn upload_url(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadUrlRequest>,
) -> AppResult<Json<UploadUrlResponse>> {
    let response = media::request_upload_url(&state, auth_user.id, &req).await?;
    Ok(Json(response))
}

/// GET /media/url?path=... - resolve a stored media path to a signed
/// download URL.
pub async fn media_url(
    _auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaUrlQuery>,
) -> AppResult<Json<MediaUrlResponse>> {
    let url = media::get_media_url(&state, &query.path).await?;
    Ok(Json(MediaUrlResponse { url }))
}
