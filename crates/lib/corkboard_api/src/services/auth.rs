//! Access token signing and verification (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Access token lifetime: 15 minutes.
const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID.
    pub sub: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

impl TokenClaims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))
    }
}

/// Length of the signing secret generated when `JWT_SECRET` is unset.
const GENERATED_SECRET_LEN: usize = 64;

/// Signing secret from `JWT_SECRET`, or a random one for this process.
///
/// A generated secret only verifies tokens this process signed, so tokens
/// from the real issuer are rejected until `JWT_SECRET` is set.
pub fn resolve_jwt_secret() -> String {
    secret_or_generated(std::env::var("JWT_SECRET").ok())
}

fn secret_or_generated(configured: Option<String>) -> String {
    if let Some(secret) = configured
        && !secret.is_empty()
    {
        return secret;
    }
    warn!("JWT_SECRET not set, generated a random signing secret for this process");
    rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Sign an access token for `user_id`.
pub fn generate_access_token(user_id: Uuid, secret: &[u8]) -> AppResult<String> {
    let now = Utc::now();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: (now + Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS)).timestamp(),
        iat: now.timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AppError::Internal(format!("jwt encode: {e}")))
}

/// Verify an access token, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<TokenClaims> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<TokenClaims>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}
