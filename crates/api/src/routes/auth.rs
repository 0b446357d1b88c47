//! Authentication routes: password login, token refresh and profile.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crm_common::error::AppError;
use crm_engine::users::UserService;

use crate::extract::ApiJson;
use crate::middleware::auth::{AuthUser, TokenKind, decode_jwt, encode_access, encode_refresh};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/auth/login: Check credentials, return access and refresh tokens.
async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let user = UserService::authenticate(&state.pool, &req.email, &req.password).await?;

    let config = &state.config;
    let token = encode_access(&user, &config.jwt_secret, config.jwt_expiry_hours)?;
    let refresh_token = encode_refresh(&user, &config.jwt_secret, config.jwt_refresh_expiry_hours)?;

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "data": {
            "token": token,
            "refresh_token": refresh_token,
            "user": user,
        }
    })))
}

/// POST /api/auth/refresh: Exchange a refresh token for a new access token.
async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    let claims = decode_jwt(&req.refresh_token, &state.config.jwt_secret)?;
    if claims.kind != TokenKind::Refresh {
        return Err(AppError::Forbidden("A refresh token is required".to_string()));
    }
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Forbidden("Invalid user ID in token".to_string()))?;

    // Role or status may have changed since the refresh token was issued.
    let user = UserService::find_active(&state.pool, user_id).await?;
    let token = encode_access(&user, &state.config.jwt_secret, state.config.jwt_expiry_hours)?;

    tracing::debug!(user_id = %user.id, "Access token refreshed");
    Ok(Json(json!({ "success": true, "token": token })))
}

/// GET /api/auth/me: Profile of the authenticated user.
async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Value>, AppError> {
    let user = UserService::get(&state.pool, auth.user_id).await?;
    Ok(Json(json!({ "success": true, "data": user })))
}
