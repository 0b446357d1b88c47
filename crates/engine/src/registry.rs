//! Channel registry: which recipients have live channels open, and how to
//! reach them.
//!
//! Each live channel owns a bounded outbound queue. Pushing never waits: a
//! full or closed queue is reported to the caller, who logs it and moves on.
//! State is in-memory only and does not survive a restart.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Identity of a single live channel (one socket, one device/tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("channel {0} outbound queue is full")]
    Full(ChannelId),

    #[error("channel {0} is closed")]
    Closed(ChannelId),
}

/// A point-in-time handle to a live channel. The channel may close at any
/// moment after the handle was taken; pushing then fails with `Closed`.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub user_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ChannelHandle {
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full(self.id),
            TrySendError::Closed(_) => PushError::Closed(self.id),
        })
    }
}

#[derive(Default)]
struct Channels {
    by_user: HashMap<Uuid, HashMap<ChannelId, mpsc::Sender<ServerEvent>>>,
    owners: HashMap<ChannelId, Uuid>,
}

/// Concurrent recipient → live channels mapping.
pub struct ChannelRegistry {
    buffer: usize,
    channels: RwLock<Channels>,
}

impl ChannelRegistry {
    /// `buffer` is the outbound queue size of each channel.
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            channels: RwLock::new(Channels::default()),
        }
    }

    /// Register a new live channel for an authenticated recipient.
    ///
    /// The returned receiver is the channel's outbound queue; the connection
    /// task drains it into the socket.
    pub fn register(&self, user_id: Uuid) -> (ChannelId, mpsc::Receiver<ServerEvent>) {
        let id = ChannelId::new();
        let (tx, rx) = mpsc::channel(self.buffer);

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.by_user.entry(user_id).or_default().insert(id, tx);
        channels.owners.insert(id, user_id);
        let open = channels.by_user.get(&user_id).map_or(0, HashMap::len);
        drop(channels);

        tracing::info!(channel_id = %id, user_id = %user_id, open, "Channel registered");
        (id, rx)
    }

    /// Remove a channel. Unknown or already removed channels are ignored.
    pub fn unregister(&self, id: ChannelId) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let Some(user_id) = channels.owners.remove(&id) else {
            return;
        };

        let remaining = match channels.by_user.get_mut(&user_id) {
            Some(user_channels) => {
                user_channels.remove(&id);
                user_channels.len()
            }
            None => 0,
        };
        if remaining == 0 {
            channels.by_user.remove(&user_id);
        }
        drop(channels);

        tracing::info!(channel_id = %id, user_id = %user_id, remaining, "Channel unregistered");
    }

    /// Snapshot of the recipient's live channels.
    pub fn channels_for(&self, user_id: Uuid) -> Vec<ChannelHandle> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .by_user
            .get(&user_id)
            .map(|user_channels| {
                user_channels
                    .iter()
                    .map(|(id, tx)| ChannelHandle {
                        id: *id,
                        user_id,
                        tx: tx.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reverse lookup: the recipient a channel belongs to.
    pub fn recipient_of(&self, id: ChannelId) -> Option<Uuid> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.owners.get(&id).copied()
    }

    pub fn handle(&self, id: ChannelId) -> Option<ChannelHandle> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let user_id = *channels.owners.get(&id)?;
        let tx = channels.by_user.get(&user_id)?.get(&id)?.clone();
        Some(ChannelHandle { id, user_id, tx })
    }

    /// Push an event to every live channel of a recipient.
    ///
    /// Failures are logged and skipped. Returns how many channels accepted
    /// the event.
    pub fn broadcast(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for handle in self.channels_for(user_id) {
            match handle.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(
                    user_id = %user_id,
                    event = event.name(),
                    error = %err,
                    "Push to live channel failed"
                ),
            }
        }
        delivered
    }

    /// Push an event to a single channel, logging failure.
    pub fn send_to(&self, id: ChannelId, event: ServerEvent) -> bool {
        let Some(handle) = self.handle(id) else {
            tracing::debug!(channel_id = %id, event = event.name(), "Channel already gone");
            return false;
        };
        let name = event.name();
        match handle.push(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(channel_id = %id, event = name, error = %err, "Push to live channel failed");
                false
            }
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.by_user.contains_key(&user_id)
    }

    /// Number of live channels across all recipients.
    pub fn channel_count(&self) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.owners.len()
    }
}
