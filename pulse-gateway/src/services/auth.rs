use diesel::prelude::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use pulse_shared::errors::{AppError, AppResult, ErrorCode};
use pulse_shared::types::auth::{Claims, Principal};

use crate::models::User;
use crate::schema::users;

/// Decode and validate the bearer credential against the shared secret.
pub fn decode_claims(secret: &str, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Full verification: signature, expiry, and subject resolution. A token
/// whose subject has no user row is rejected the same way a forged one is.
pub fn verify_credential(
    conn: &mut PgConnection,
    secret: &str,
    token: &str,
) -> AppResult<Principal> {
    let claims = decode_claims(secret, token)?;

    let user: User = users::table
        .find(claims.sub)
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UnknownSubject, "subject is not a known user"))?;

    Ok(Principal {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn mint(secret: &str, claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn roundtrip_claims() {
        let id = Uuid::new_v4();
        let claims = Claims::new(id, "a@example.com", "Ada", 3600);
        let token = mint("test-secret", &claims);

        let decoded = decode_claims("test-secret", &token).unwrap();
        assert_eq!(decoded.sub, id);
        assert_eq!(decoded.email, "a@example.com");
        assert_eq!(decoded.name, "Ada");
        assert!(decoded.exp > decoded.iat);
    }

    #[test]
    fn bad_secret_rejects() {
        let claims = Claims::new(Uuid::new_v4(), "a@example.com", "Ada", 3600);
        let token = mint("secret-a", &claims);
        let err = decode_claims("secret-b", &token).unwrap_err();
        assert_eq!(err.wire_code(), ErrorCode::TokenInvalid.code());
    }

    #[test]
    fn expired_token_rejects() {
        let mut claims = Claims::new(Uuid::new_v4(), "a@example.com", "Ada", 3600);
        claims.iat = Utc::now().timestamp() - 7200;
        claims.exp = Utc::now().timestamp() - 3600;
        let token = mint("test-secret", &claims);
        let err = decode_claims("test-secret", &token).unwrap_err();
        assert_eq!(err.wire_code(), ErrorCode::TokenExpired.code());
    }
}
