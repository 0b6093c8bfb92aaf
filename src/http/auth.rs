//! JWT verification boundary.
//!
//! Token issuance belongs to the identity service; this extractor only
//! verifies the bearer token and exposes the caller's id and role.

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::accounts::Role;
use crate::app::AppContext;
use crate::error::AppError;

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    pub role: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

impl AuthUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("Authorization header must be a Bearer token"))?;

        let key = DecodingKey::from_secret(
            state.jwt_secret.expose_secret().as_bytes(),
        );
        let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|_| AppError::unauthorized("Invalid or expired access token"))?;

        let role = Role::parse(&data.claims.role)
            .ok_or_else(|| AppError::unauthorized("Unknown role in access token"))?;

        Ok(AuthUser {
            id: data.claims.sub,
            role,
        })
    }
}

/// Mint an access token. Only used by tests and the dev seeder; the
/// identity service issues real tokens with the same shape.
pub fn issue_access_token(secret: &str, account_id: &str, role: Role, ttl_seconds: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let claims = Claims {
        sub: account_id.to_string(),
        role: role.as_str().to_string(),
        exp: now + ttl_seconds,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 signing cannot fail with a valid key")
}
