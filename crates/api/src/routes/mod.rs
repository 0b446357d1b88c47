pub mod auth;
pub mod dashboard;
pub mod health;
pub mod leads;
pub mod notifications;

use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(notifications::router())
        .merge(leads::router())
        .merge(dashboard::router())
        .merge(ws::router())
        .with_state(state)
}
