use actix_web::{HttpMessage, HttpRequest};
use argon2::{self, Config as ArgonConfig};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::config::Config;
use crate::errors::ApiError;
use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub exp: usize,  // Expiration time as UTC timestamp
    pub iat: usize,  // Issued-at as UTC timestamp
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();

    argon2::hash_encoded(password.as_bytes(), &salt, &config)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(hashed_password: &str, password: &str) -> bool {
    argon2::verify_encoded(hashed_password, password.as_bytes()).unwrap_or(false)
}

pub fn create_access_token(user_id: i64, config: &Config) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let expiration = now + chrono::Duration::minutes(config.access_token_expire_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to encode token: {}", e)))
}

// Decodes and validates a bearer token, returning the user id it carries.
pub fn decode_access_token(token: &str, secret: &str) -> Result<i64, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => {
            ApiError::Unauthenticated("Token has expired".to_string())
        }
        _ => ApiError::Unauthenticated("Could not validate credentials".to_string()),
    })?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthenticated("Could not validate credentials".to_string()))
}

// The middleware stores the caller's id in the request extensions; handlers
// that need an identity resolve it to a user row here.
pub async fn current_user(pool: &PgPool, req: &HttpRequest) -> Result<User, ApiError> {
    let user_id = req
        .extensions()
        .get::<i64>()
        .copied()
        .ok_or_else(|| ApiError::Unauthenticated("Not authenticated".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, hashed_password, role FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    user.ok_or_else(|| ApiError::Unauthenticated("Could not validate credentials".to_string()))
}

pub async fn current_admin(pool: &PgPool, req: &HttpRequest) -> Result<User, ApiError> {
    let user = current_user(pool, req).await?;

    if user.role != "admin" {
        return Err(ApiError::Forbidden(
            "The user does not have administrative privileges".to_string(),
        ));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_a_password_produces_a_verifiable_hash() {
        let hashed = hash_password("mysecretpassword").unwrap();

        assert_ne!(hashed, "mysecretpassword");
        assert!(verify_password(&hashed, "mysecretpassword"));
        assert!(!verify_password(&hashed, "wrong_password"));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("password123").unwrap();
        let second = hash_password("password123").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn token_round_trip_returns_the_user_id() {
        let config = Config::for_tests("test-secret");

        let token = create_access_token(42, &config).unwrap();
        let user_id = decode_access_token(&token, &config.jwt_secret).unwrap();

        assert_eq!(user_id, 42);
    }

    #[test]
    fn token_signed_with_a_different_secret_is_rejected() {
        let config = Config::for_tests("test-secret");
        let token = create_access_token(42, &config).unwrap();

        let err = decode_access_token(&token, "other-secret").unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn malformed_token_is_rejected() {
        let err = decode_access_token("this.is.not.a.valid.token", "test-secret").unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "42".to_string(),
            exp: (now - 7200) as usize,
            iat: (now - 10800) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_ref()),
        )
        .unwrap();

        let err = decode_access_token(&token, "test-secret").unwrap_err();
        match err {
            ApiError::Unauthenticated(detail) => assert_eq!(detail, "Token has expired"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn token_with_a_non_numeric_subject_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "not-a-number".to_string(),
            exp: (now + 3600) as usize,
            iat: now as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_ref()),
        )
        .unwrap();

        let err = decode_access_token(&token, "test-secret").unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }
}
