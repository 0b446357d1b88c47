//! Dashboard summary for the authenticated user.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crm_common::error::AppError;
use crm_engine::leads::LeadService;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(stats))
}

/// GET /api/dashboard/stats: Open leads, pipeline value and unread notifications.
async fn stats(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Value>, AppError> {
    let unread = state.store.unread_count(auth.user_id).await?;
    let totals = LeadService::totals_for(&state.pool, auth.user_id).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "total_leads": totals.total_leads,
            "pipeline_value": totals.pipeline_value,
            "unread_notifications": unread,
        }
    })))
}
