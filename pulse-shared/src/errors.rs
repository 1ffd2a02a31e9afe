use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{domain}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E2xxx: Conversation errors
/// - E3xxx: Message errors
/// - E4xxx: Media errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    Conflict,
    DependencyFailure,
    PayloadTooLarge,

    // Auth (E1xxx)
    TokenExpired,
    TokenInvalid,
    UnknownSubject,

    // Conversations (E2xxx)
    ConversationNotFound,
    NotConversationMember,
    GroupNameRequired,
    InvalidMemberSet,
    UserNotFound,

    // Messages (E3xxx)
    MessageNotFound,
    EmptyContent,
    MediaPathRequired,

    // Media (E4xxx)
    UnsupportedMediaType,
    FileTooLarge,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::BadRequest => "E0006",
            Self::Conflict => "E0007",
            Self::DependencyFailure => "E0008",
            Self::PayloadTooLarge => "E0009",

            // Auth
            Self::TokenExpired => "E1001",
            Self::TokenInvalid => "E1002",
            Self::UnknownSubject => "E1003",

            // Conversations
            Self::ConversationNotFound => "E2001",
            Self::NotConversationMember => "E2002",
            Self::GroupNameRequired => "E2003",
            Self::InvalidMemberSet => "E2004",
            Self::UserNotFound => "E2005",

            // Messages
            Self::MessageNotFound => "E3001",
            Self::EmptyContent => "E3002",
            Self::MediaPathRequired => "E3003",

            // Media
            Self::UnsupportedMediaType => "E4001",
            Self::FileTooLarge => "E4002",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::DependencyFailure => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::BadRequest | Self::GroupNameRequired
            | Self::InvalidMemberSet | Self::EmptyContent | Self::MediaPathRequired
            | Self::UnsupportedMediaType => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge | Self::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::ConversationNotFound | Self::MessageNotFound
            | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid
            | Self::UnknownSubject => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotConversationMember => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("store unavailable: {0}")]
    Dependency(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Stable string code for this error, used in socket error replies.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Known { code, .. } => code.code(),
            Self::Internal(_) => ErrorCode::InternalError.code(),
            Self::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound.code(),
            Self::Database(_) => ErrorCode::InternalError.code(),
            Self::Dependency(_) => ErrorCode::DependencyFailure.code(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::Dependency(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message } => {
                (code.status_code(), ApiErrorResponse::new(code.code(), message))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Dependency(msg) => {
                tracing::error!(error = %msg, "dependency failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0008", "downstream dependency unavailable"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::NotConversationMember.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ConversationNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EmptyContent.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::FileTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DependencyFailure.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(ErrorCode::TokenExpired.code(), "E1001");
        assert_eq!(ErrorCode::NotConversationMember.code(), "E2002");
        assert_eq!(AppError::Dependency("down".into()).wire_code(), "E0008");
        assert_eq!(
            AppError::Database(diesel::result::Error::NotFound).wire_code(),
            "E0003"
        );
    }
}
