use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::MessageKind;
use crate::services::conversations;
use crate::AppState;

pub const UPLOAD_URL_TTL_SECS: u64 = 300;
pub const DOWNLOAD_URL_TTL_SECS: u64 = 3600;

pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: u64 = 20 * 1024 * 1024;

// --- DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub conversation_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub file_path: String,
    pub token: String,
    pub media_type: MessageKind,
    pub expires_in: u64,
}

// --- Classification & policy ---

fn classify_mime(mime: &str) -> Option<MessageKind> {
    match mime {
        "image/jpeg" | "image/png" | "image/gif" | "image/webp" => Some(MessageKind::Image),
        "video/mp4" | "video/quicktime" | "video/webm" => Some(MessageKind::Video),
        _ => None,
    }
}

fn check_policy(mime: &str, file_size: u64) -> AppResult<MessageKind> {
    let media_type = classify_mime(mime).ok_or_else(|| {
        AppError::new(
            ErrorCode::UnsupportedMediaType,
            "accepted: jpeg, png, gif, webp, mp4, quicktime, webm",
        )
    })?;

    let max = match media_type {
        MessageKind::Video => MAX_VIDEO_BYTES,
        _ => MAX_IMAGE_BYTES,
    };
    if file_size > max {
        return Err(AppError::new(
            ErrorCode::FileTooLarge,
            format!("file exceeds the {max}-byte limit for {media_type}"),
        ));
    }

    Ok(media_type)
}

/// Strip path components, then replace anything outside `[A-Za-z0-9._-]`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn build_media_path(conversation_id: Uuid, user_id: Uuid, epoch_millis: i64, file_name: &str) -> String {
    format!(
        "conversations/{conversation_id}/{user_id}_{epoch_millis}_{}",
        sanitize_file_name(file_name)
    )
}

// --- Operations ---

/// Authorize an upload and hand back a presigned PUT. Membership gates the
/// request; mime and size policy gate the file.
pub async fn request_upload_url(
    state: &AppState,
    actor: Uuid,
    req: &UploadUrlRequest,
) -> AppResult<UploadUrlResponse> {
    {
        let mut conn = state.db.get().map_err(|e| AppError::Internal(e.into()))?;
        conversations::ensure_member(&mut conn, req.conversation_id, actor)?;
    }

    let media_type = check_policy(&req.mime_type, req.file_size)?;

    let path = build_media_path(
        req.conversation_id,
        actor,
        Utc::now().timestamp_millis(),
        &req.file_name,
    );

    let upload = state
        .blob
        .create_signed_upload_url(&path, UPLOAD_URL_TTL_SECS)
        .await
        .map_err(AppError::Dependency)?;

    tracing::debug!(
        user_id = %actor,
        conversation_id = %req.conversation_id,
        path = %upload.path,
        media_type = %media_type,
        "upload url issued"
    );

    Ok(UploadUrlResponse {
        upload_url: upload.signed_url,
        file_path: upload.path,
        token: upload.token,
        media_type,
        expires_in: UPLOAD_URL_TTL_SECS,
    })
}

/// Presigned GET for a stored path. No membership re-check: paths only ever
/// reach a client through history reads, which already enforce membership.
pub async fn get_media_url(state: &AppState, file_path: &str) -> AppResult<String> {
    state
        .blob
        .create_signed_download_url(file_path, DOWNLOAD_URL_TTL_SECS)
        .await
        .map_err(AppError::Dependency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_classification() {
        assert_eq!(classify_mime("image/jpeg"), Some(MessageKind::Image));
        assert_eq!(classify_mime("image/webp"), Some(MessageKind::Image));
        assert_eq!(classify_mime("video/quicktime"), Some(MessageKind::Video));
        assert_eq!(classify_mime("application/pdf"), None);
        assert_eq!(classify_mime("image/svg+xml"), None);
    }

    #[test]
    fn image_size_boundary() {
        assert!(check_policy("image/png", MAX_IMAGE_BYTES).is_ok());
        let err = check_policy("image/png", MAX_IMAGE_BYTES + 1).unwrap_err();
        assert_eq!(err.wire_code(), ErrorCode::FileTooLarge.code());
    }

    #[test]
    fn video_size_boundary() {
        assert!(check_policy("video/mp4", MAX_VIDEO_BYTES).is_ok());
        assert!(check_policy("video/mp4", MAX_VIDEO_BYTES + 1).is_err());
        // Video limit does not apply to images.
        assert!(check_policy("image/gif", MAX_IMAGE_BYTES + 1).is_err());
    }

    #[test]
    fn file_names_sanitized() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("my file (1).png"), "my_file__1_.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("a\\b\\clip.mp4"), "clip.mp4");
        assert_eq!(sanitize_file_name("héllo.jpg"), "h_llo.jpg");
    }

    #[test]
    fn media_path_shape() {
        let conversation_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let path = build_media_path(conversation_id, user_id, 1700000000000, "a b.png");
        assert_eq!(
            path,
            format!("conversations/{conversation_id}/{user_id}_1700000000000_a_b.png")
        );
    }
}
