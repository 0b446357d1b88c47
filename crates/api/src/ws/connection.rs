use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use crm_engine::events::{ClientEvent, ServerEvent};
use crm_engine::registry::{ChannelId, ChannelRegistry};
use crm_engine::sync::ReadStateSynchronizer;

#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("{0}")]
    Close(&'static str),

    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// One authenticated live channel.
///
/// Drains the channel's outbound queue into the socket, applies client
/// actions through the synchronizer and keeps the socket alive with pings.
/// The channel is unregistered when the connection is dropped.
pub struct LiveConnection<WebSocketSink, WebSocketStream> {
    registry: Arc<ChannelRegistry>,
    sync: Arc<ReadStateSynchronizer>,

    user_id: Uuid,
    channel: ChannelId,

    events_rx: mpsc::Receiver<ServerEvent>,
    ws_tx: WebSocketSink,
    ws_rx: WebSocketStream,

    ping_interval: Duration,
    ping_time: Instant,
    ping_message: u32,
    pings_sent: u8,
}

impl<WebSocketSink, WebSocketStream, SinkError, StreamError>
    LiveConnection<WebSocketSink, WebSocketStream>
where
    WebSocketSink: Sink<Message, Error = SinkError> + Unpin,
    WebSocketStream: Stream<Item = Result<Message, StreamError>> + Unpin,
    SinkError: Display,
    StreamError: Display,
{
    /// Register a new channel for `user_id` and wrap the socket halves.
    pub fn open(
        registry: Arc<ChannelRegistry>,
        sync: Arc<ReadStateSynchronizer>,
        user_id: Uuid,
        ping_interval: Duration,
        ws_tx: WebSocketSink,
        ws_rx: WebSocketStream,
    ) -> Self {
        let (channel, events_rx) = registry.register(user_id);

        Self {
            registry,
            sync,
            user_id,
            channel,
            events_rx,
            ws_tx,
            ws_rx,
            ping_interval,
            ping_time: Instant::now() + ping_interval,
            ping_message: 0,
            pings_sent: 0,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    #[tracing::instrument(
        name = "WebSocket",
        skip_all,
        fields(
            user_id = %self.user_id,
            channel_id = %self.channel,
        )
    )]
    pub async fn run(mut self) {
        match self.try_run().await {
            Ok(()) => (),
            Err(ConnectionError::Close(message)) => {
                tracing::info!("closing connection: {message}");
            }
            Err(ConnectionError::Anyhow(err)) => {
                tracing::warn!("{err}");
            }
        }

        match self.ws_tx.close().await {
            Ok(()) => tracing::debug!("websocket closed"),
            Err(err) => tracing::debug!(%err, "failed to close websocket"),
        }
    }

    async fn try_run(&mut self) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                biased;

                _ = sleep_until(self.ping_time) => {
                    self.process_ping().await?;
                }

                message = self.ws_rx.next() => {
                    self.process_incoming_message(message).await?;
                }

                event = self.events_rx.recv() => {
                    self.process_event(event).await?;
                }
            }
        }
    }

    async fn process_ping(&mut self) -> anyhow::Result<()> {
        // Two pings without a matching pong: the peer is gone.
        if self.pings_sent > 1 {
            anyhow::bail!("user unresponsive");
        }

        if self.pings_sent == 0 {
            self.ping_message = self.ping_message.wrapping_add(1);
        }

        let payload = Bytes::copy_from_slice(&self.ping_message.to_be_bytes());
        self.ws_tx
            .send(Message::Ping(payload))
            .await
            .map_err(|err| anyhow!("failed to send ping: {err}"))?;
        tracing::trace!(ping_message = self.ping_message, "ping sent");

        self.pings_sent += 1;
        self.ping_time = Instant::now() + self.ping_interval;

        Ok(())
    }

    async fn process_incoming_message(
        &mut self,
        message: Option<Result<Message, StreamError>>,
    ) -> Result<(), ConnectionError> {
        match message {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => {
                        tracing::debug!(?event, "client action");
                        self.sync.handle(self.channel, event).await;
                    }
                    Err(err) => {
                        tracing::debug!(%err, "malformed client frame");
                        self.sync
                            .reject(self.channel, format!("Invalid message: {err}"));
                    }
                }
            }
            Some(Ok(Message::Binary(_))) => {
                self.sync
                    .reject(self.channel, "Binary frames are not supported");
            }
            Some(Ok(Message::Ping(_))) => tracing::trace!("ping received"),
            Some(Ok(Message::Pong(payload))) => self.process_pong(&payload),
            Some(Ok(Message::Close(_))) => {
                return Err(ConnectionError::Close("received close message"));
            }
            Some(Err(err)) => {
                return Err(ConnectionError::Anyhow(anyhow!(
                    "failed to read incoming message: {err}"
                )));
            }
            None => return Err(ConnectionError::Close("incoming stream closed")),
        }

        Ok(())
    }

    fn process_pong(&mut self, payload: &[u8]) {
        let Ok(bytes) = <[u8; 4]>::try_from(payload) else {
            tracing::trace!(len = payload.len(), "unexpected pong payload");
            return;
        };

        // A late pong for an earlier ping is harmless.
        if self.pings_sent == 0 || u32::from_be_bytes(bytes) != self.ping_message {
            tracing::trace!("pong was not expected");
            return;
        }

        self.ping_time = Instant::now() + self.ping_interval;
        self.pings_sent = 0;
    }

    async fn process_event(&mut self, event: Option<ServerEvent>) -> Result<(), ConnectionError> {
        let Some(event) = event else {
            return Err(ConnectionError::Close("channel unregistered"));
        };

        let payload = serde_json::to_string(&event)
            .map_err(|err| anyhow!("failed to encode {} event: {err}", event.name()))?;
        self.ws_tx
            .send(Message::Text(payload.into()))
            .await
            .map_err(|err| anyhow!("failed to send {} event: {err}", event.name()))?;
        tracing::debug!(event = event.name(), "event sent");

        Ok(())
    }
}

impl<WebSocketSink, WebSocketStream> Drop for LiveConnection<WebSocketSink, WebSocketStream> {
    fn drop(&mut self) {
        self.registry.unregister(self.channel);
    }
}
