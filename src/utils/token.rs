use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<Role>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Unauthorized("invalid_subject".to_string()))
    }
}

/// HS256 bearer token for `user_id`. The role claim is advisory; the identity
/// provider's answer is what requests run under.
pub fn issue_access_token(user_id: Uuid, role: Role, ttl: Duration, secret: &str) -> Result<String> {
    let exp = (Utc::now() + ttl).timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: usize::try_from(exp).map_err(|_| Error::Internal("token expiry out of range".to_string()))?,
        role: Some(role),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| Error::Unauthorized("invalid_token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode_with_the_same_secret() {
        let id = Uuid::new_v4();
        let token = issue_access_token(id, Role::Freelancer, Duration::minutes(5), "s3cret").unwrap();
        let claims = decode_access_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id().unwrap(), id);
        assert_eq!(claims.role, Some(Role::Freelancer));
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_unauthorized() {
        let id = Uuid::new_v4();
        let token = issue_access_token(id, Role::Client, Duration::minutes(5), "a").unwrap();
        assert!(matches!(decode_access_token(&token, "b"), Err(Error::Unauthorized(_))));

        let stale = issue_access_token(id, Role::Client, Duration::minutes(-10), "a").unwrap();
        assert!(matches!(decode_access_token(&stale, "a"), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let claims = Claims { sub: "bob".into(), exp: 0, role: None };
        assert!(matches!(claims.user_id(), Err(Error::Unauthorized(_))));
    }
}
