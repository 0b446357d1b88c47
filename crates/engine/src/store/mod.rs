//! Notification store: the durable per-recipient notification ledger.
//!
//! Every operation is scoped to a recipient. An id that exists but belongs to
//! another recipient is reported exactly like an id that does not exist.

mod memory;
mod postgres;

pub use memory::MemoryNotificationStore;
pub use postgres::PgNotificationStore;

use async_trait::async_trait;
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{NewNotification, Notification, NotificationPage, NotificationQuery};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Durable CRUD over notifications, scoped per recipient.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a new unread notification and return the stored record.
    async fn create(&self, new: NewNotification) -> Result<Notification, AppError>;

    /// List a recipient's notifications, newest first.
    async fn list(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> Result<NotificationPage, AppError>;

    /// Mark one notification as read. Repeating the call is a no-op.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError>;

    /// Mark every unread notification of the recipient as read in one step.
    /// Returns the number of notifications that changed.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Permanently delete one notification.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError>;
}

pub(crate) fn validate_new(new: &NewNotification) -> Result<(), AppError> {
    if new.user_id.is_nil() {
        return Err(AppError::Validation("Recipient is required".to_string()));
    }
    if new.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if new.message.trim().is_empty() {
        return Err(AppError::Validation("Message is required".to_string()));
    }
    Ok(())
}

/// Resolve `(limit, offset)` from a query, applying defaults and bounds.
pub(crate) fn page_bounds(query: &NotificationQuery) -> Result<(i64, i64), AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::Validation(
            "offset must not be negative".to_string(),
        ));
    }
    Ok((limit, offset))
}

pub(crate) fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Notification {} not found", id))
}
