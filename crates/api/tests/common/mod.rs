//! Shared helpers for API tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crm_api::middleware::auth::encode_access;
use crm_api::state::AppState;
use crm_common::config::AppConfig;
use crm_common::types::{User, UserRole, UserStatus};
use crm_engine::store::MemoryNotificationStore;

pub const TEST_SECRET: &str = "test-jwt-secret-for-integration-tests";

/// Create a test AppConfig with a specific JWT secret.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused@localhost/unused".to_string(),
        db_max_connections: 5,
        bind_address: "127.0.0.1:0".parse().unwrap(),
        jwt_secret: TEST_SECRET.to_string(),
        jwt_expiry_hours: 24,
        jwt_refresh_expiry_hours: 168,
        allowed_origins: Vec::new(),
        ws_channel_buffer: 16,
        ws_ping_interval_secs: 30,
        log_json: false,
    }
}

/// State backed by the in-memory store and a pool that never connects.
pub fn memory_state() -> (AppState, Arc<MemoryNotificationStore>) {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    let store = Arc::new(MemoryNotificationStore::new());
    (AppState::with_store(pool, config, store.clone()), store)
}

pub fn db_state(pool: PgPool) -> AppState {
    AppState::new(pool, test_config())
}

pub fn test_user(role: UserRole) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Test User".to_string(),
        email: format!("{}@test.local", Uuid::new_v4()),
        password_hash: String::new(),
        role,
        status: UserStatus::Active,
        phone: None,
        avatar_url: None,
        last_login_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn token_for(user: &User) -> String {
    encode_access(user, TEST_SECRET, 24).unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
