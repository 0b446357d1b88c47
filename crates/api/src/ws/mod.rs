//! Live notification channel over WebSocket.
//!
//! The handshake is authenticated before the upgrade: the access token comes
//! from `?token=` (browsers cannot set headers on a WebSocket) or from the
//! `Authorization` header.

mod connection;

pub use connection::LiveConnection;

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use futures::StreamExt;
use serde::Deserialize;

use crm_common::error::AppError;

use crate::extract::ApiQuery;
use crate::middleware::auth::{authenticate_token, bearer_token};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_upgrade))
}

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    pub token: Option<String>,
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(params): ApiQuery<HandshakeParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::Auth("Access token required".to_string()))?;
    let auth = authenticate_token(token, &state.config.jwt_secret)?;
    let ws = ws?;

    let ping_interval = Duration::from_secs(state.config.ws_ping_interval_secs.max(1));
    tracing::debug!(user_id = %auth.user_id, "WebSocket handshake accepted");

    Ok(ws.on_upgrade(move |socket| async move {
        let (ws_tx, ws_rx) = socket.split();
        LiveConnection::open(
            state.registry.clone(),
            state.sync.clone(),
            auth.user_id,
            ping_interval,
            ws_tx,
            ws_rx,
        )
        .run()
        .await;
    }))
}
