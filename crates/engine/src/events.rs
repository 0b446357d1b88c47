//! Live channel protocol.
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crm_common::types::Notification;

/// Events pushed from the server to a live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new notification arrived.
    Notification(Notification),
    NotificationRead { id: Uuid },
    NotificationDeleted { id: Uuid },
    NotificationsReadAll { updated: u64 },
    /// Sent only to the channel whose action failed.
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Notification(_) => "notification",
            ServerEvent::NotificationRead { .. } => "notification_read",
            ServerEvent::NotificationDeleted { .. } => "notification_deleted",
            ServerEvent::NotificationsReadAll { .. } => "notifications_read_all",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Actions a client may send over its live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    MarkAsRead { id: Uuid },
    DeleteNotification { id: Uuid },
}
