use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use shared::{
    config::server::StreamConfig,
    models::{Heartbeat, Identity, PushEvent, Timestamp},
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{SharedRegistry, UnregisterOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Superseded,
    Closed,
}

const STATE_OPEN: u8 = 0;
const STATE_SUPERSEDED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// A push write that did not reach the stream. Never surfaced to API callers;
/// the handle is unregistered instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportWriteError {
    #[error("stream buffer is full")]
    Full,
    #[error("stream is closed")]
    Closed,
}

/// Server side of one open push stream.
#[derive(Debug)]
pub struct StreamHandle {
    id: Uuid,
    identity: Identity,
    sender: mpsc::Sender<PushEvent>,
    token: CancellationToken,
    state: AtomicU8,
    opened_at: Instant,
    /// Milliseconds after `opened_at` of the last successful write.
    last_write_ms: AtomicU64,
}

impl StreamHandle {
    /// Creates a handle and the receiving half the transport drains.
    pub fn open(identity: Identity, capacity: usize) -> (Arc<Self>, mpsc::Receiver<PushEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            token: CancellationToken::new(),
            state: AtomicU8::new(STATE_OPEN),
            opened_at: Instant::now(),
            last_write_ms: AtomicU64::new(0),
        });
        (handle, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> HandleState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => HandleState::Open,
            STATE_SUPERSEDED => HandleState::Superseded,
            _ => HandleState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open && !self.sender.is_closed()
    }

    /// Writes one frame without waiting for buffer space.
    ///
    /// # Errors
    /// Returns [`TransportWriteError`] when the handle is no longer open or
    /// the frame cannot be queued.
    pub fn write(&self, event: PushEvent) -> Result<(), TransportWriteError> {
        if self.state() != HandleState::Open {
            return Err(TransportWriteError::Closed);
        }

        match self.sender.try_send(event) {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportWriteError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportWriteError::Closed),
        }
    }

    /// Writes a heartbeat. A full buffer skips the beat instead of failing;
    /// a reader that never drains is caught by the idle sweep.
    ///
    /// # Errors
    /// Returns [`TransportWriteError::Closed`] when the stream is gone.
    pub fn ping(&self) -> Result<(), TransportWriteError> {
        match self.write(PushEvent::Ping(Heartbeat {
            at: Timestamp::now(),
        })) {
            Err(TransportWriteError::Full) => Ok(()),
            other => other,
        }
    }

    /// `OPEN -> SUPERSEDED`; cancels the stream so the transport closes it.
    pub fn mark_superseded(&self) -> bool {
        if self
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_SUPERSEDED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            self.token.cancel();
            counter!("beacon_stream_supersedes_total").increment(1);
            true
        } else {
            false
        }
    }

    /// Moves to `CLOSED` from any state. Returns whether this call closed it.
    pub fn close(&self) -> bool {
        let previous = self.state.swap(STATE_CLOSED, Ordering::SeqCst);
        self.token.cancel();
        if previous == STATE_CLOSED {
            false
        } else {
            let lifetime_ms = self.opened_at.elapsed().as_secs_f64() * 1000.0;
            histogram!("beacon_stream_lifetime_ms").record(lifetime_ms);
            true
        }
    }

    /// Time since the last successful write, or since opening.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_write_ms.load(Ordering::SeqCst));
        self.opened_at.elapsed().saturating_sub(last)
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.opened_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_write_ms.store(elapsed, Ordering::SeqCst);
    }
}

/// Keeps registered streams alive and evicts idle ones.
#[derive(Debug)]
pub struct StreamSupervisor {
    registry: SharedRegistry,
    heartbeat_interval: Duration,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl StreamSupervisor {
    pub fn new(registry: SharedRegistry, config: &StreamConfig) -> Self {
        Self {
            registry,
            heartbeat_interval: config.heartbeat_interval(),
            idle_timeout: config.idle_timeout(),
            sweep_interval: config.sweep_interval(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Pings `handle` every heartbeat interval until it is cancelled or a
    /// write fails, in which case it is unregistered.
    pub fn spawn_heartbeat(&self, handle: Arc<StreamHandle>) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let cadence = self.heartbeat_interval.max(Duration::from_millis(1));
        let token = handle.cancellation_token();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + cadence, cadence);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(err) = handle.ping() {
                            counter!("beacon_heartbeat_failures_total").increment(1);
                            warn!(
                                identity = %handle.identity(),
                                handle_id = %handle.id(),
                                error = %err,
                                "heartbeat write failed; unregistering stream"
                            );
                            registry.unregister(handle.identity(), handle.id()).await;
                            handle.close();
                            break;
                        }
                    }
                }
            }
            debug!(handle_id = %handle.id(), "heartbeat task finished");
        })
    }

    /// Closes and unregisters every handle idle for at least the timeout.
    /// Returns the number evicted.
    pub async fn sweep_once(&self) -> usize {
        let mut evicted = 0;
        for handle in self.registry.handles().await {
            if handle.idle_for() < self.idle_timeout {
                continue;
            }

            let outcome = self
                .registry
                .unregister(handle.identity(), handle.id())
                .await;
            handle.close();
            if outcome == UnregisterOutcome::Removed {
                evicted += 1;
                counter!("beacon_stream_idle_evictions_total").increment(1);
                info!(
                    identity = %handle.identity(),
                    handle_id = %handle.id(),
                    idle = ?handle.idle_for(),
                    "evicted idle stream"
                );
            }
        }
        evicted
    }

    /// Runs [`StreamSupervisor::sweep_once`] periodically until `shutdown`.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(supervisor.sweep_interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        supervisor.sweep_once().await;
                    }
                }
            }
        })
    }
}

pub type SharedStreamSupervisor = Arc<StreamSupervisor>;
