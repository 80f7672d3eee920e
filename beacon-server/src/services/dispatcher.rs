use std::sync::Arc;

use metrics::counter;
use shared::models::{
    Identity, Message, MessageFrame, Notification, NotificationFrame, PublicProfile, PushEvent,
};
use tracing::{debug, warn};

use super::{directory::SharedDirectory, registry::SharedRegistry};

/// What happened to a push. Informational only; it never changes the
/// response of the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    NotRegistered,
    /// The write failed and the stream was unregistered.
    Dropped,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::NotRegistered => "not_registered",
            DispatchOutcome::Dropped => "dropped",
        }
    }
}

/// Pushes persisted records to their recipient's stream, if one is open.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
    directory: SharedDirectory,
}

impl Dispatcher {
    pub fn new(registry: SharedRegistry, directory: SharedDirectory) -> Self {
        Self {
            registry,
            directory,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Pushes a `message.new` frame to `message.to_identity`.
    pub async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        let sender_profile = self.sender_profile(&message.from_identity).await;
        let event = PushEvent::Message(MessageFrame {
            message: message.clone(),
            sender_profile,
        });
        self.deliver(&message.to_identity, event, "message").await
    }

    /// Pushes a `notification.new` frame to `notification.recipient`.
    pub async fn dispatch_notification(&self, notification: &Notification) -> DispatchOutcome {
        let sender_profile = self.sender_profile(&notification.sender).await;
        let event = PushEvent::Notification(NotificationFrame {
            notification: notification.clone(),
            sender_profile,
        });
        self.deliver(&notification.recipient, event, "notification")
            .await
    }

    async fn sender_profile(&self, identity: &Identity) -> PublicProfile {
        match self.directory.get(identity).await {
            Ok(Some(profile)) => profile,
            Ok(None) => PublicProfile::placeholder(identity),
            Err(err) => {
                warn!(identity = %identity, error = %err, "sender profile lookup failed");
                PublicProfile::placeholder(identity)
            }
        }
    }

    async fn deliver(
        &self,
        recipient: &Identity,
        event: PushEvent,
        kind: &'static str,
    ) -> DispatchOutcome {
        let outcome = match self.registry.lookup(recipient).await {
            None => DispatchOutcome::NotRegistered,
            Some(handle) => match handle.write(event) {
                Ok(()) => DispatchOutcome::Delivered,
                Err(err) => {
                    warn!(
                        identity = %recipient,
                        handle_id = %handle.id(),
                        error = %err,
                        "push write failed; unregistering stream"
                    );
                    self.registry.unregister(recipient, handle.id()).await;
                    handle.close();
                    DispatchOutcome::Dropped
                }
            },
        };

        counter!("beacon_dispatch_total", "outcome" => outcome.as_str(), "kind" => kind)
            .increment(1);
        debug!(identity = %recipient, kind, outcome = outcome.as_str(), "dispatch finished");
        outcome
    }
}

pub type SharedDispatcher = Arc<Dispatcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        directory::{InMemoryProfileDirectory, ProfileDirectory},
        registry::{ChannelRegistry, InMemoryChannelRegistry},
        stream_supervisor::{HandleState, StreamHandle},
    };
    use shared::models::{
        InteractionKind, MessageBody, MessageKind, Timestamp, UpsertProfileRequest,
    };
    use uuid::Uuid;

    fn message(from: &str, to: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            from_identity: Identity::from(from),
            to_identity: Identity::from(to),
            body: MessageBody::text("hello"),
            kind: MessageKind::Text,
            created_at: Timestamp::now(),
            sequence: 1,
            seen: false,
        }
    }

    fn setup() -> (Dispatcher, SharedRegistry, Arc<InMemoryProfileDirectory>) {
        let registry: SharedRegistry = Arc::new(InMemoryChannelRegistry::new());
        let directory = Arc::new(InMemoryProfileDirectory::new());
        let dispatcher = Dispatcher::new(registry.clone(), directory.clone());
        (dispatcher, registry, directory)
    }

    #[tokio::test]
    async fn delivers_frame_with_sender_snapshot() {
        let (dispatcher, registry, directory) = setup();
        directory
            .upsert(
                &Identity::from("alice"),
                UpsertProfileRequest {
                    display_name: "Alice".into(),
                    username: None,
                    avatar_url: Some("https://cdn.example/alice.png".into()),
                },
            )
            .await
            .unwrap();

        let (handle, mut rx) = StreamHandle::open(Identity::from("bob"), 4);
        registry.register(handle).await;

        let sent = message("alice", "bob");
        assert_eq!(dispatcher.dispatch(&sent).await, DispatchOutcome::Delivered);

        match rx.recv().await {
            Some(PushEvent::Message(frame)) => {
                assert_eq!(frame.message, sent);
                assert_eq!(frame.sender_profile.display_name, "Alice");
                assert_eq!(
                    frame.sender_profile.avatar_url.as_deref(),
                    Some("https://cdn.example/alice.png")
                );
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_recipient_is_not_an_error() {
        let (dispatcher, _registry, _directory) = setup();
        assert_eq!(
            dispatcher.dispatch(&message("alice", "bob")).await,
            DispatchOutcome::NotRegistered
        );
    }

    #[tokio::test]
    async fn failed_write_unregisters_without_retry() {
        let (dispatcher, registry, _directory) = setup();
        let bob = Identity::from("bob");
        let (handle, rx) = StreamHandle::open(bob.clone(), 4);
        registry.register(handle.clone()).await;
        drop(rx);

        assert_eq!(
            dispatcher.dispatch(&message("alice", "bob")).await,
            DispatchOutcome::Dropped
        );
        assert!(registry.lookup(&bob).await.is_none());
        assert_eq!(handle.state(), HandleState::Closed);

        assert_eq!(
            dispatcher.dispatch(&message("alice", "bob")).await,
            DispatchOutcome::NotRegistered
        );
    }

    #[tokio::test]
    async fn superseded_stream_gets_nothing() {
        let (dispatcher, registry, _directory) = setup();
        let bob = Identity::from("bob");
        let (first, mut first_rx) = StreamHandle::open(bob.clone(), 4);
        let (second, mut second_rx) = StreamHandle::open(bob.clone(), 4);
        registry.register(first).await;
        registry.register(second).await;

        assert_eq!(
            dispatcher.dispatch(&message("alice", "bob")).await,
            DispatchOutcome::Delivered
        );
        assert!(matches!(second_rx.recv().await, Some(PushEvent::Message(_))));
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notification_uses_placeholder_for_unknown_sender() {
        let (dispatcher, registry, _directory) = setup();
        let (handle, mut rx) = StreamHandle::open(Identity::from("bob"), 4);
        registry.register(handle).await;

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient: Identity::from("bob"),
            sender: Identity::from("zed"),
            kind: InteractionKind::Like,
            post_id: Some("post-1".into()),
            text: None,
            read: false,
            created_at: Timestamp::now(),
        };
        assert_eq!(
            dispatcher.dispatch_notification(&notification).await,
            DispatchOutcome::Delivered
        );

        match rx.recv().await {
            Some(PushEvent::Notification(frame)) => {
                assert_eq!(frame.sender_profile.display_name, "zed");
                assert_eq!(frame.notification.kind, InteractionKind::Like);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
