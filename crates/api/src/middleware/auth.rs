//! JWT authentication middleware and helpers.
//!
//! Provides access/refresh token encoding plus an `AuthUser` Axum extractor
//! that validates the Authorization header on protected routes.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{User, UserRole};

use crate::state::AppState;

/// Which flow a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's UUID
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub kind: TokenKind,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated user extracted from an access token.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the authenticated user's UUID
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub claims: Claims,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role != UserRole::Admin {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }
        Ok(())
    }
}

fn encode_token(user: &User, kind: TokenKind, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        kind,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to encode JWT: {}", e)))
}

/// Encode a short-lived access token for a user.
pub fn encode_access(user: &User, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    encode_token(user, TokenKind::Access, secret, expiry_hours)
}

/// Encode a refresh token, only accepted by the refresh endpoint.
pub fn encode_refresh(user: &User, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    encode_token(user, TokenKind::Refresh, secret, expiry_hours)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Forbidden(format!("Invalid or expired token: {}", e)))?;

    Ok(token_data.claims)
}

/// Token from an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate an access token and resolve the user it was issued for.
pub fn authenticate_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let claims = decode_jwt(token, secret)?;
    if claims.kind != TokenKind::Access {
        return Err(AppError::Forbidden("Refresh tokens cannot be used here".to_string()));
    }
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Forbidden("Invalid user ID in token".to_string()))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
        claims,
    })
}

/// Axum `FromRequestParts` implementation for `AuthUser`.
///
/// A missing token is a 401; a token that is present but invalid, expired,
/// or of the wrong kind is a 403.
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();
        let token = bearer_token(&parts.headers).map(str::to_string);

        async move {
            let Some(token) = token else {
                return Err(AppError::Auth("Access token required".to_string()));
            };
            authenticate_token(&token, &secret)
        }
    }
}
