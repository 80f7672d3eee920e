use std::sync::Arc;

use shared::config::server::Config;
use sqlx::PgPool;

use crate::services::{
    MessagingService,
    directory::{InMemoryProfileDirectory, SharedDirectory},
    dispatcher::Dispatcher,
    message_store::{InMemoryMessageStore, SharedMessageStore},
    notification_store::{InMemoryNotificationStore, SharedNotificationStore},
    postgres::{PgMessageStore, PgNotificationStore, PgProfileDirectory},
    registry::{InMemoryChannelRegistry, SharedRegistry},
    stream_supervisor::{SharedStreamSupervisor, StreamSupervisor},
};

/// Application state shared across all routes.
#[derive(Clone, Debug)]
pub struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) pool: Option<PgPool>,
    pub(crate) registry: SharedRegistry,
    pub(crate) supervisor: SharedStreamSupervisor,
    pub(crate) messaging: Arc<MessagingService>,
}

impl AppState {
    /// State backed by process-local stores.
    pub fn in_memory(config: Arc<Config>) -> Self {
        Self::assemble(
            config,
            None,
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(InMemoryProfileDirectory::new()),
            Arc::new(InMemoryNotificationStore::new()),
        )
    }

    /// State backed by Postgres tables.
    pub fn postgres(config: Arc<Config>, pool: PgPool) -> Self {
        Self::assemble(
            config,
            Some(pool.clone()),
            Arc::new(PgMessageStore::new(pool.clone())),
            Arc::new(PgProfileDirectory::new(pool.clone())),
            Arc::new(PgNotificationStore::new(pool)),
        )
    }

    fn assemble(
        config: Arc<Config>,
        pool: Option<PgPool>,
        messages: SharedMessageStore,
        directory: SharedDirectory,
        notifications: SharedNotificationStore,
    ) -> Self {
        let registry: SharedRegistry = Arc::new(InMemoryChannelRegistry::new());
        let supervisor = Arc::new(StreamSupervisor::new(registry.clone(), &config.stream));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), directory.clone()));
        let messaging = Arc::new(MessagingService::new(
            messages,
            directory,
            notifications,
            dispatcher,
            &config.store,
        ));

        Self {
            config,
            pool,
            registry,
            supervisor,
            messaging,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn supervisor(&self) -> &SharedStreamSupervisor {
        &self.supervisor
    }

    pub fn messaging(&self) -> &MessagingService {
        &self.messaging
    }
}

pub type SharedAppState = Arc<AppState>;
