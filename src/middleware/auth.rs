// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.
//!
//! Sign-in happens at the identity provider; this service only verifies the
//! HS256 session token it issued and turns its claims into an [`Identity`].

use crate::models::Identity;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "herd_token";

/// How long an issued token stays valid.
const TOKEN_LIFETIME_DAYS: i64 = 30;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id at the identity provider)
    pub sub: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Profile photo URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            uid: claims.sub,
            display_name: claims.name,
            email: claims.email.filter(|e| !e.trim().is_empty()),
            photo_url: claims.picture.filter(|p| !p.is_empty()),
        }
    }
}

/// Middleware that requires valid JWT authentication.
///
/// On success the request carries the caller's [`Identity`] as an extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = match jar.get(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .ok_or(StatusCode::UNAUTHORIZED)?,
    };

    let identity = verify_jwt(&token, &state.config.jwt_signing_key).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        StatusCode::UNAUTHORIZED
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Decode and validate a session token.
pub fn verify_jwt(token: &str, signing_key: &[u8]) -> Result<Identity, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);
    let claims = decode::<Claims>(token, &key, &validation)?.claims;
    if claims.sub.trim().is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }
    Ok(claims.into())
}

/// Create a JWT for a user session.
pub fn create_jwt(identity: &Identity, signing_key: &[u8]) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let exp = now + chrono::Duration::days(TOKEN_LIFETIME_DAYS);

    let claims = Claims {
        sub: identity.uid.clone(),
        name: identity.display_name.clone(),
        email: identity.email.clone(),
        picture: identity.photo_url.clone(),
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_jwt_key_32_bytes_minimum!!";

    fn identity() -> Identity {
        Identity {
            uid: "uid-ada".to_string(),
            display_name: "Ada Lovelace".to_string(),
            email: Some("ada@example.com".to_string()),
            photo_url: None,
        }
    }

    #[test]
    fn test_jwt_round_trip_carries_identity() {
        let token = create_jwt(&identity(), KEY).unwrap();
        assert_eq!(verify_jwt(&token, KEY).unwrap(), identity());
    }

    #[test]
    fn test_jwt_wrong_key_rejected() {
        let token = create_jwt(&identity(), KEY).unwrap();
        assert!(verify_jwt(&token, b"some_other_key_that_is_long_enough").is_err());
    }

    #[test]
    fn test_jwt_empty_subject_rejected() {
        let mut nobody = identity();
        nobody.uid = String::new();
        let token = create_jwt(&nobody, KEY).unwrap();
        assert!(verify_jwt(&token, KEY).is_err());
    }
}
