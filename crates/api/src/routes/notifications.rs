//! Notification routes for the authenticated user.
//!
//! Read and delete changes made here are also pushed to the user's open
//! live channels.

use axum::extract::State;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{NewNotification, NotificationCategory, NotificationQuery};
use crm_engine::users::UserService;

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/broadcast", post(broadcast))
        .route("/api/notifications/{id}/read", patch(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
}

/// Request body for an admin broadcast.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub category: NotificationCategory,
    #[serde(default)]
    pub extra_data: Option<Value>,
}

/// GET /api/notifications: Page through the user's notifications, newest first.
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state.store.list(auth.user_id, &query).await?;

    Ok(Json(json!({
        "success": true,
        "data": page.items,
        "total": page.total,
        "unread_count": page.unread_count,
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let count = state.store.unread_count(auth.user_id).await?;
    Ok(Json(json!({ "success": true, "unread_count": count })))
}

/// PATCH /api/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.sync.mark_read(auth.user_id, id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Notification marked as read",
    })))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, AppError> {
    let updated = state.sync.mark_all_read(auth.user_id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

/// DELETE /api/notifications/{id}
async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.sync.delete(auth.user_id, id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Notification deleted",
    })))
}

/// POST /api/notifications/broadcast: Notify every active user. Admin only.
async fn broadcast(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<BroadcastRequest>,
) -> Result<Json<Value>, AppError> {
    auth.require_admin()?;

    let mut template = NewNotification::new(Uuid::nil(), req.title, req.message)
        .with_category(req.category);
    template.extra_data = req.extra_data;
    if template.title.trim().is_empty() || template.message.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and message are required".to_string(),
        ));
    }

    let recipients = UserService::active_ids(&state.pool).await?;
    let sent_to = state.dispatcher.notify_all(&recipients, &template).await?;

    tracing::info!(admin_id = %auth.user_id, sent_to, "Admin broadcast sent");
    Ok(Json(json!({ "success": true, "sent_to": sent_to })))
}
