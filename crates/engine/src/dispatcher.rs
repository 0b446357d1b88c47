//! Delivery dispatcher: the single entry point for notifying a user.
//!
//! A notification is persisted first; only a stored notification is pushed
//! to the recipient's live channels. Push is best-effort: failures are logged
//! and never undo the write or fail the caller. Recipients without a live
//! channel pick the notification up from the next listing.

use std::sync::Arc;

use uuid::Uuid;

use crm_common::error::AppError;
use crm_common::types::{NewNotification, Notification};

use crate::events::ServerEvent;
use crate::registry::ChannelRegistry;
use crate::store::NotificationStore;

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    registry: Arc<ChannelRegistry>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, registry: Arc<ChannelRegistry>) -> Self {
        Self { store, registry }
    }

    /// Persist a notification and push it to the recipient's live channels.
    pub async fn notify(&self, new: NewNotification) -> Result<Notification, AppError> {
        let notification = self.store.create(new).await?;

        let delivered = self
            .registry
            .broadcast(notification.user_id, &ServerEvent::Notification(notification.clone()));

        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            category = %notification.category,
            delivered,
            "Notification dispatched"
        );

        Ok(notification)
    }

    /// Send the same notification to several recipients, in order.
    ///
    /// Stops at the first recipient whose notification cannot be stored and
    /// returns that error. Returns the number of recipients notified.
    pub async fn notify_all(
        &self,
        recipients: &[Uuid],
        template: &NewNotification,
    ) -> Result<usize, AppError> {
        for user_id in recipients {
            let new = NewNotification {
                user_id: *user_id,
                ..template.clone()
            };
            self.notify(new).await?;
        }

        tracing::info!(recipients = recipients.len(), title = %template.title, "Broadcast dispatched");
        Ok(recipients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNotificationStore;
    use crm_common::types::{NotificationCategory, NotificationQuery};

    fn setup() -> (
        Arc<MemoryNotificationStore>,
        Arc<ChannelRegistry>,
        NotificationDispatcher,
    ) {
        let store = Arc::new(MemoryNotificationStore::new());
        let registry = Arc::new(ChannelRegistry::new(8));
        let dispatcher = NotificationDispatcher::new(store.clone(), registry.clone());
        (store, registry, dispatcher)
    }

    #[tokio::test]
    async fn test_notify_offline_recipient_is_stored() {
        let (store, _registry, dispatcher) = setup();
        let user = Uuid::new_v4();

        let created = dispatcher
            .notify(NewNotification::new(user, "Nuevo Lead Asignado", "..."))
            .await
            .unwrap();

        let page = store.list(user, &NotificationQuery::default()).await.unwrap();
        assert_eq!(page.items, vec![created]);
        assert_eq!(page.unread_count, 1);
    }

    #[tokio::test]
    async fn test_notify_pushes_to_every_live_channel() {
        let (_store, registry, dispatcher) = setup();
        let user = Uuid::new_v4();
        let (_c1, mut rx1) = registry.register(user);
        let (_c2, mut rx2) = registry.register(user);

        let created = dispatcher
            .notify(
                NewNotification::new(user, "Recordatorio", "Reunión a las 15:00")
                    .with_category(NotificationCategory::Warning),
            )
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap(), ServerEvent::Notification(created.clone()));
        assert_eq!(rx2.recv().await.unwrap(), ServerEvent::Notification(created));
    }

    #[tokio::test]
    async fn test_notify_preserves_order_per_recipient() {
        let (_store, registry, dispatcher) = setup();
        let user = Uuid::new_v4();
        let (_c, mut rx) = registry.register(user);

        for title in ["first", "second", "third"] {
            dispatcher
                .notify(NewNotification::new(user, title, "body"))
                .await
                .unwrap();
        }

        for expected in ["first", "second", "third"] {
            match rx.recv().await.unwrap() {
                ServerEvent::Notification(n) => assert_eq!(n.title, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_store_failure_skips_push() {
        let (store, registry, dispatcher) = setup();
        let user = Uuid::new_v4();
        let (_c, mut rx) = registry.register(user);
        store.set_unavailable(true);

        let result = dispatcher
            .notify(NewNotification::new(user, "t", "m"))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_push() {
        let (store, registry, dispatcher) = setup();
        let user = Uuid::new_v4();
        let (_c, mut rx) = registry.register(user);

        let result = dispatcher
            .notify(NewNotification::new(user, "", "m"))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(rx.try_recv().is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_fail_notify() {
        let (store, registry, dispatcher) = setup();
        let user = Uuid::new_v4();
        let (_closed, closed_rx) = registry.register(user);
        let (_open, mut open_rx) = registry.register(user);
        drop(closed_rx);

        let created = dispatcher
            .notify(NewNotification::new(user, "t", "m"))
            .await
            .unwrap();

        assert_eq!(open_rx.recv().await.unwrap(), ServerEvent::Notification(created));
        assert_eq!(store.unread_count(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notify_all() {
        let (store, _registry, dispatcher) = setup();
        let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let template = NewNotification::new(Uuid::nil(), "Aviso", "Mantenimiento programado");

        let sent = dispatcher.notify_all(&users, &template).await.unwrap();

        assert_eq!(sent, 3);
        for user in users {
            assert_eq!(store.unread_count(user).await.unwrap(), 1);
        }
    }
}
