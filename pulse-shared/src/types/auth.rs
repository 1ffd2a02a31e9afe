use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by the bearer credential minted by the identity
/// front-door. Both sides hold the same symmetric secret; the core only
/// ever verifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: impl Into<String>, name: impl Into<String>, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            email: email.into(),
            name: name.into(),
            iat: now,
            exp: now + duration_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// An authenticated REST caller, produced by the bearer-token extractor.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            display_name: claims.name,
        }
    }
}

/// An authenticated socket principal whose subject resolved to a persisted
/// user row.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_not_expired() {
        let claims = Claims::new(Uuid::new_v4(), "a@example.com", "A", 3600);
        assert!(!claims.is_expired());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn past_expiry_detected() {
        let mut claims = Claims::new(Uuid::new_v4(), "a@example.com", "A", 3600);
        claims.exp = Utc::now().timestamp() - 10;
        assert!(claims.is_expired());
    }

    #[test]
    fn auth_user_from_claims() {
        let id = Uuid::new_v4();
        let claims = Claims::new(id, "b@example.com", "B", 60);
        let user = AuthUser::from(claims);
        assert_eq!(user.id, id);
        assert_eq!(user.email, "b@example.com");
        assert_eq!(user.display_name, "B");
    }
}
