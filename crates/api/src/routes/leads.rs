//! Lead routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crm_common::error::AppError;
use crm_engine::leads::{CreateLeadParams, LeadService, ListLeadsParams};

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/leads", get(list_leads).post(create_lead))
        .route("/api/leads/pipeline", get(pipeline))
        .route("/api/leads/{id}/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status_id: i32,
}

/// GET /api/leads: Filtered, paginated leads.
async fn list_leads(
    State(state): State<AppState>,
    _auth: AuthUser,
    ApiQuery(params): ApiQuery<ListLeadsParams>,
) -> Result<Json<Value>, AppError> {
    let page = LeadService::list(&state.pool, &params).await?;

    Ok(Json(json!({
        "success": true,
        "data": page.items,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "total": page.total,
        }
    })))
}

/// GET /api/leads/pipeline: Open leads grouped by status, for the Kanban board.
async fn pipeline(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let stages = LeadService::pipeline(&state.pool).await?;
    Ok(Json(json!({ "success": true, "data": stages })))
}

/// POST /api/leads: Create a lead, assigned to the caller unless stated.
async fn create_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(params): ApiJson<CreateLeadParams>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let lead = LeadService::create(&state.pool, &state.dispatcher, auth.user_id, &params).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Lead created",
            "data": lead,
        })),
    ))
}

/// PATCH /api/leads/{id}/status
async fn update_status(
    State(state): State<AppState>,
    _auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let lead = LeadService::update_status(&state.pool, &state.dispatcher, id, req.status_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Status updated",
        "data": lead,
    })))
}
