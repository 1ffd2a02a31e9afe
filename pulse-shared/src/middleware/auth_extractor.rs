use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims};

/// Guard for REST handlers: validates the bearer credential's signature and
/// expiry against the shared secret. Subject resolution against the user
/// table is the socket handshake's job; REST handlers that need the row
/// load it themselves and surface not-found on a missing user.
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "bearer credential required"))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::new(ErrorCode::Unauthorized, "credential must use the Bearer scheme")
        })?;

        verify_bearer(token).map(AuthUser::from)
    }
}

fn verify_bearer(token: &str) -> Result<Claims, AppError> {
    let secret = std::env::var("PULSE__JWT_SECRET")
        .unwrap_or_else(|_| "development-secret-change-in-production".to_string());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "bearer credential has expired")
        }
        _ => AppError::new(
            ErrorCode::TokenInvalid,
            "bearer credential failed verification",
        ),
    })
}
