//! Login sessions as HS256 JWTs, issued after a successful OTP verify.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::entities::users::{self, UserRole};

/// Sessions last 30 days, matching the storefront's login expectations
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i32,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
}

impl SessionKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user: &users::Model) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            exp: chrono::Utc::now().timestamp() + SESSION_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> users::Model {
        users::Model {
            id: 7,
            email: "user@example.com".to_string(),
            name: Some("Test User".to_string()),
            phone: None,
            role: UserRole::Customer,
            email_verified_at: None,
            created_at: chrono::Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let keys = SessionKeys::new(b"test-secret");
        let token = keys.issue(&sample_user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.role, UserRole::Customer);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keys = SessionKeys::new(b"test-secret");
        let other = SessionKeys::new(b"other-secret");
        let token = keys.issue(&sample_user()).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let keys = SessionKeys::new(b"test-secret");
        assert!(keys.verify("not.a.token").is_err());
    }
}
