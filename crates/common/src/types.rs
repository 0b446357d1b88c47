use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification categories, rendered by clients as colour/icon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationCategory::Info => write!(f, "info"),
            NotificationCategory::Success => write!(f, "success"),
            NotificationCategory::Warning => write!(f, "warning"),
            NotificationCategory::Error => write!(f, "error"),
        }
    }
}

/// A notification owned by exactly one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    #[sqlx(rename = "is_read")]
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Opaque payload, carried through unchanged
    pub extra_data: Option<serde_json::Value>,
}

/// Input for creating a notification. Id and timestamps are always assigned
/// by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub category: NotificationCategory,
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn new(user_id: Uuid, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            category: NotificationCategory::Info,
            extra_data: None,
        }
    }

    pub fn with_category(mut self, category: NotificationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_extra_data(mut self, extra_data: serde_json::Value) -> Self {
        self.extra_data = Some(extra_data);
        self
    }
}

/// Filter and pagination for listing a recipient's notifications.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    pub read: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One page of notifications plus recipient-wide aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    /// Rows matching the filter
    pub total: i64,
    /// Unread rows of the recipient, ignoring filter and pagination
    pub unread_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// User roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Agent,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Manager => write!(f, "manager"),
            UserRole::Agent => write!(f, "agent"),
        }
    }
}

/// Account state. Only active users may sign in or receive broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// A user in the system.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A step of the sales pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadStatus {
    pub id: i32,
    pub name: String,
    pub color: Option<String>,
    pub sort_order: i32,
}

/// A sales lead.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub source: String,
    pub status_id: i32,
    pub assigned_to: Option<Uuid>,
    pub estimated_value: Option<f64>,
    pub close_probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub converted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A lead joined with its status and assignee names, as shown in listings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lead: Lead,
    pub status_name: Option<String>,
    pub status_color: Option<String>,
    pub assigned_name: Option<String>,
}
