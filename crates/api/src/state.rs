//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use crm_common::config::AppConfig;
use crm_engine::dispatcher::NotificationDispatcher;
use crm_engine::registry::ChannelRegistry;
use crm_engine::store::{NotificationStore, PgNotificationStore};
use crm_engine::sync::ReadStateSynchronizer;

/// Application state shared across all route handlers via Axum `State`.
///
/// One registry instance is shared by the dispatcher, the synchronizer and
/// the WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub store: Arc<dyn NotificationStore>,
    pub registry: Arc<ChannelRegistry>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sync: Arc<ReadStateSynchronizer>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let store = Arc::new(PgNotificationStore::new(pool.clone()));
        Self::with_store(pool, config, store)
    }

    /// Build state around an explicit notification store.
    pub fn with_store(pool: PgPool, config: AppConfig, store: Arc<dyn NotificationStore>) -> Self {
        let registry = Arc::new(ChannelRegistry::new(config.ws_channel_buffer));
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), registry.clone()));
        let sync = Arc::new(ReadStateSynchronizer::new(store.clone(), registry.clone()));

        Self {
            pool,
            config,
            store,
            registry,
            dispatcher,
            sync,
        }
    }
}
