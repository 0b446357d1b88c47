use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{NewNotification, Notification, NotificationPage, NotificationQuery};

use super::{NotificationStore, not_found, page_bounds, validate_new};

/// In-process notification store.
///
/// Rows are kept in insertion order, so iterating backwards yields the
/// newest-first order the Postgres store produces. `set_unavailable` makes
/// every operation fail as a storage error would.
#[derive(Default)]
pub struct MemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
    unavailable: AtomicBool,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total rows held, across all recipients.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal(
                "notification store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, AppError> {
        self.check_available()?;
        validate_new(&new)?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            message: new.message,
            category: new.category,
            read: false,
            read_at: None,
            created_at: Utc::now(),
            extra_data: new.extra_data,
        };
        self.rows().push(notification.clone());

        Ok(notification)
    }

    async fn list(
        &self,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> Result<NotificationPage, AppError> {
        self.check_available()?;
        let (limit, offset) = page_bounds(query)?;

        let rows = self.rows();
        let owned: Vec<&Notification> = rows.iter().rev().filter(|n| n.user_id == user_id).collect();
        let unread_count = owned.iter().filter(|n| !n.read).count() as i64;

        let matching: Vec<&Notification> = owned
            .into_iter()
            .filter(|n| query.read.is_none_or(|read| n.read == read))
            .collect();
        let total = matching.len() as i64;

        let items = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(NotificationPage {
            items,
            total,
            unread_count,
            limit,
            offset,
        })
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        self.check_available()?;

        let mut rows = self.rows();
        let notification = rows
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| not_found(id))?;

        if !notification.read {
            notification.read = true;
            notification.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.check_available()?;

        let now = Utc::now();
        let mut updated = 0;
        for notification in self
            .rows()
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            notification.read = true;
            notification.read_at = Some(now);
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        self.check_available()?;

        let mut rows = self.rows();
        let idx = rows
            .iter()
            .position(|n| n.id == id && n.user_id == user_id)
            .ok_or_else(|| not_found(id))?;
        rows.remove(idx);
        Ok(())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        self.check_available()?;

        let count = self
            .rows()
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count();
        Ok(count as i64)
    }
}
