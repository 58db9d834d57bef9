//! Admin authentication: HS256 JWTs issued out of band.
//!
//! Logging in is somebody else's job. This module only mints tokens for the
//! CLI and checks the ones admin routes receive.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// JWT claims embedded in admin access tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (admin identifier, recorded as `approved_by` / `added_by`)
    pub sub: String,
    /// Role; only "admin" is accepted
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token type ("access")
    pub token_type: String,
}

impl Claims {
    pub fn is_admin_access(&self) -> bool {
        self.token_type == ACCESS_TOKEN_TYPE && self.role == ADMIN_ROLE
    }
}

/// Generate an admin access token.
pub fn generate_admin_token(
    subject: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        role: ADMIN_ROLE.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs as i64)).timestamp(),
        token_type: ACCESS_TOKEN_TYPE.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate and decode a JWT token.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
