//! Access tokens and password hashing.
//!
//! Tokens are HS256 JWTs carrying the user id plus optional identity
//! hints; passwords are argon2id PHC strings. The `AuthUser` extractor
//! authenticates handlers from the Authorization header.

use crate::server::AppState;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use quib_common::{QuibError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Payload carried in an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_seconds: u64,
}

impl TokenIssuer {
    pub fn new(secret: String, expiry_seconds: u64) -> Self {
        Self {
            secret,
            expiry_seconds,
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        wallet: Option<&str>,
        email: Option<&str>,
        username: Option<&str>,
    ) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| QuibError::Auth(format!("system time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: user_id.to_string(),
            wallet: wallet.map(str::to_string),
            email: email.map(str::to_string),
            username: username.map(str::to_string),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| QuibError::Auth(format!("token encoding failed: {}", e)))
    }

    /// Validate a token's signature and expiry and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| QuibError::Auth(format!("invalid token: {}", e)))
    }
}

/// Hash a password with argon2id; the PHC string embeds salt and params.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| QuibError::Auth(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| QuibError::Auth(format!("invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Lowercase 0x-prefixed address check; we never recover signatures
/// server-side, so the format is all we can vouch for.
pub fn is_valid_wallet_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Authenticated request identity, extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub wallet: Option<String>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        let claims = state
            .tokens
            .verify(token)
            .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            wallet: claims.wallet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("0123456789abcdef0123456789abcdef".to_string(), 3600)
    }

    #[test]
    fn token_round_trip() {
        let issuer = issuer();
        let token = issuer
            .issue("user-1", Some("0xabc"), None, Some("quibfan"))
            .unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.wallet.as_deref(), Some("0xabc"));
        assert_eq!(claims.username.as_deref(), Some("quibfan"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issuer().issue("user-1", None, None, None).unwrap();
        let other = TokenIssuer::new("ffffffffffffffffffffffffffffffff".to_string(), 3600);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(issuer().verify("not-a-jwt").is_err());
    }

    #[test]
    fn password_hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn distinct_salts_per_hash() {
        let h1 = hash_password("same").unwrap();
        let h2 = hash_password("same").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn wallet_address_format() {
        assert!(is_valid_wallet_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!is_valid_wallet_address("0x123"));
        assert!(!is_valid_wallet_address(
            "52908400098527886E0F7030069857D2E4169EE700"
        ));
        assert!(!is_valid_wallet_address(
            "0xZZ908400098527886E0F7030069857D2E4169EE7"
        ));
    }
}
