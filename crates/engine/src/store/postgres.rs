use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{NewNotification, Notification, NotificationPage, NotificationQuery};

use super::{NotificationStore, not_found, page_bounds, validate_new};

/// Postgres `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, AppError> {
        validate_new(&new)?;

        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (id, user_id, title, message, category, extra_data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, title, message, category, is_read, read_at, created_at, extra_data
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.category.to_string())
        .bind(&new.extra_data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let unknown_recipient = e
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == FOREIGN_KEY_VIOLATION);
            if unknown_recipient {
                AppError::Validation(format!("Recipient {} does not exist", new.user_id))
            } else {
                AppError::Database(e)
            }
        })?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            category = %notification.category,
            "Notification stored"
        );

        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> Result<NotificationPage, AppError> {
        let (limit, offset) = page_bounds(query)?;

        let items: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, message, category, is_read, read_at, created_at, extra_data
            FROM notifications
            WHERE user_id = $1
              AND ($2::boolean IS NULL OR is_read = $2)
            ORDER BY created_at DESC, seq DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(query.read)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = $1
              AND ($2::boolean IS NULL OR is_read = $2)
            "#,
        )
        .bind(user_id)
        .bind(query.read)
        .fetch_one(&self.pool)
        .await?;

        let unread_count = self.unread_count(user_id).await?;

        Ok(NotificationPage {
            items,
            total,
            unread_count,
            limit,
            offset,
        })
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        tracing::debug!(notification_id = %id, user_id = %user_id, "Notification marked read");
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        tracing::debug!(user_id = %user_id, updated, "All notifications marked read");
        Ok(updated)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        tracing::debug!(notification_id = %id, user_id = %user_id, "Notification deleted");
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
