use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use shared::models::Identity;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::stream_supervisor::StreamHandle;

/// Result of an unregister request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
    Removed,
    /// A newer handle owns the identity; nothing was removed.
    Stale,
    Absent,
}

/// Process-wide map from identity to its single active stream.
#[async_trait]
pub trait ChannelRegistry: Debug + Send + Sync {
    /// Stores `handle` as the identity's active stream. A previous handle is
    /// marked superseded and returned.
    async fn register(&self, handle: Arc<StreamHandle>) -> Option<Arc<StreamHandle>>;

    /// Removes the mapping only if it still points at `handle_id`.
    async fn unregister(&self, identity: &Identity, handle_id: Uuid) -> UnregisterOutcome;

    async fn lookup(&self, identity: &Identity) -> Option<Arc<StreamHandle>>;

    /// Snapshot of all registered handles.
    async fn handles(&self) -> Vec<Arc<StreamHandle>>;

    async fn len(&self) -> usize;
}

pub type SharedRegistry = Arc<dyn ChannelRegistry>;

#[derive(Debug, Default)]
pub struct InMemoryChannelRegistry {
    inner: RwLock<HashMap<Identity, Arc<StreamHandle>>>,
}

impl InMemoryChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_open_streams(count: usize) {
    metrics::gauge!("beacon_streams_open").set(count as f64);
}

#[async_trait]
impl ChannelRegistry for InMemoryChannelRegistry {
    async fn register(&self, handle: Arc<StreamHandle>) -> Option<Arc<StreamHandle>> {
        let identity = handle.identity().clone();
        let handle_id = handle.id();

        let (previous, count) = {
            let mut guard = self.inner.write().await;
            let previous = guard.insert(identity.clone(), handle);
            if let Some(previous) = previous.as_ref() {
                previous.mark_superseded();
            }
            (previous, guard.len())
        };

        record_open_streams(count);
        match previous.as_ref() {
            Some(old) => info!(
                identity = %identity,
                handle_id = %handle_id,
                superseded = %old.id(),
                "stream registered; previous stream superseded"
            ),
            None => info!(identity = %identity, handle_id = %handle_id, "stream registered"),
        }

        previous
    }

    async fn unregister(&self, identity: &Identity, handle_id: Uuid) -> UnregisterOutcome {
        let (outcome, count) = {
            let mut guard = self.inner.write().await;
            let outcome = match guard.get(identity) {
                Some(current) if current.id() == handle_id => {
                    guard.remove(identity);
                    UnregisterOutcome::Removed
                }
                Some(_) => UnregisterOutcome::Stale,
                None => UnregisterOutcome::Absent,
            };
            (outcome, guard.len())
        };

        match outcome {
            UnregisterOutcome::Removed => {
                record_open_streams(count);
                info!(identity = %identity, handle_id = %handle_id, "stream unregistered");
            }
            UnregisterOutcome::Stale | UnregisterOutcome::Absent => {
                debug!(
                    identity = %identity,
                    handle_id = %handle_id,
                    outcome = ?outcome,
                    "ignored unregister for inactive stream"
                );
            }
        }

        outcome
    }

    async fn lookup(&self, identity: &Identity) -> Option<Arc<StreamHandle>> {
        self.inner.read().await.get(identity).cloned()
    }

    async fn handles(&self) -> Vec<Arc<StreamHandle>> {
        self.inner.read().await.values().cloned().collect()
    }

    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
