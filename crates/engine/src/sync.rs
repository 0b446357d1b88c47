//! Read-state synchronization across a recipient's live channels.
//!
//! Read and delete actions may arrive from any of the recipient's channels
//! or from HTTP. Every successful change is broadcast to all of the
//! recipient's channels, the originating one included, so open devices stay
//! consistent. A failed action is reported to the originating channel only.

use std::sync::Arc;

use uuid::Uuid;

use crm_common::error::AppError;

use crate::events::{ClientEvent, ServerEvent};
use crate::registry::{ChannelId, ChannelRegistry};
use crate::store::NotificationStore;

pub struct ReadStateSynchronizer {
    store: Arc<dyn NotificationStore>,
    registry: Arc<ChannelRegistry>,
}

impl ReadStateSynchronizer {
    pub fn new(store: Arc<dyn NotificationStore>, registry: Arc<ChannelRegistry>) -> Self {
        Self { store, registry }
    }

    /// Apply an action received over a live channel.
    pub async fn handle(&self, channel: ChannelId, event: ClientEvent) {
        match event {
            ClientEvent::MarkAsRead { id } => self.on_mark_read(channel, id).await,
            ClientEvent::DeleteNotification { id } => self.on_delete(channel, id).await,
        }
    }

    pub async fn on_mark_read(&self, channel: ChannelId, id: Uuid) {
        let Some(user_id) = self.recipient(channel) else {
            return;
        };

        if let Err(err) = self.mark_read(user_id, id).await {
            self.report(channel, "mark_as_read", err);
        }
    }

    pub async fn on_delete(&self, channel: ChannelId, id: Uuid) {
        let Some(user_id) = self.recipient(channel) else {
            return;
        };

        if let Err(err) = self.delete(user_id, id).await {
            self.report(channel, "delete_notification", err);
        }
    }

    /// Send an error event to a single channel, e.g. for an unparseable frame.
    pub fn reject(&self, channel: ChannelId, message: impl Into<String>) {
        self.registry.send_to(
            channel,
            ServerEvent::Error {
                message: message.into(),
            },
        );
    }

    /// Mark one notification read and tell every live channel of the recipient.
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        self.store.mark_read(user_id, id).await?;
        self.registry
            .broadcast(user_id, &ServerEvent::NotificationRead { id });
        Ok(())
    }

    /// Mark everything read and tell every live channel of the recipient.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let updated = self.store.mark_all_read(user_id).await?;
        self.registry
            .broadcast(user_id, &ServerEvent::NotificationsReadAll { updated });
        Ok(updated)
    }

    /// Delete one notification and tell every live channel of the recipient.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        self.store.delete(user_id, id).await?;
        self.registry
            .broadcast(user_id, &ServerEvent::NotificationDeleted { id });
        Ok(())
    }

    fn recipient(&self, channel: ChannelId) -> Option<Uuid> {
        let user_id = self.registry.recipient_of(channel);
        if user_id.is_none() {
            tracing::warn!(channel_id = %channel, "Action from unregistered channel dropped");
        }
        user_id
    }

    fn report(&self, channel: ChannelId, action: &str, err: AppError) {
        if err.status().is_server_error() {
            tracing::error!(channel_id = %channel, action, error = %err, "Live channel action failed");
        } else {
            tracing::debug!(channel_id = %channel, action, error = %err, "Live channel action rejected");
        }
        self.reject(channel, err.public_message());
    }
}
