//! Request-level orchestration: validate, persist, then push.

use shared::{
    config::server::StoreConfig,
    models::{
        HistoryQuery, Identity, InteractionRequest, Message, Notification, PublicProfile,
        SendMessageRequest, UpsertProfileRequest,
    },
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    directory::SharedDirectory,
    dispatcher::SharedDispatcher,
    message_store::{SharedMessageStore, StoreError, StoreResult},
    notification_store::SharedNotificationStore,
};

#[derive(Debug, Clone)]
pub struct MessagingService {
    messages: SharedMessageStore,
    directory: SharedDirectory,
    notifications: SharedNotificationStore,
    dispatcher: SharedDispatcher,
    max_page_size: u32,
    recent_limit: u32,
}

impl MessagingService {
    pub fn new(
        messages: SharedMessageStore,
        directory: SharedDirectory,
        notifications: SharedNotificationStore,
        dispatcher: SharedDispatcher,
        config: &StoreConfig,
    ) -> Self {
        Self {
            messages,
            directory,
            notifications,
            dispatcher,
            max_page_size: config.max_page_size,
            recent_limit: config.recent_limit,
        }
    }

    async fn require_known(&self, identity: &Identity) -> StoreResult<PublicProfile> {
        self.directory
            .get(identity)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("unknown identity '{identity}'")))
    }

    /// Persists a message and pushes it to the recipient's stream. Push
    /// failures never fail the send.
    ///
    /// # Errors
    /// `Validation` for malformed requests, `NotFound` for unknown recipients,
    /// or any persistence failure.
    #[instrument(name = "messaging.send", skip(self, request), fields(to = %request.to_identity), err)]
    pub async fn send(&self, from: &Identity, request: SendMessageRequest) -> StoreResult<Message> {
        let new_message = request
            .into_new_message(from.clone())
            .map_err(StoreError::Validation)?;

        self.require_known(&new_message.to).await?;
        self.directory.ensure(from).await?;

        let message = self.messages.create(new_message).await?;
        let outcome = self.dispatcher.dispatch(&message).await;
        info!(
            message_id = %message.id,
            kind = message.kind.as_str(),
            outcome = outcome.as_str(),
            "message sent"
        );

        Ok(message)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn history(
        &self,
        viewer: &Identity,
        peer: &Identity,
        query: HistoryQuery,
    ) -> StoreResult<Vec<Message>> {
        let (page, limit) = query.resolve(self.max_page_size);
        self.messages
            .list_by_conversation(viewer, peer, page, limit)
            .await
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn recent(&self, viewer: &Identity) -> StoreResult<Vec<Message>> {
        self.messages.recent_for(viewer, self.recent_limit).await
    }

    /// # Errors
    /// `NotFound` or `Forbidden` from the store.
    pub async fn mark_seen(&self, viewer: &Identity, message_id: Uuid) -> StoreResult<Message> {
        self.messages.mark_seen(viewer, message_id).await
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn mark_conversation_seen(
        &self,
        viewer: &Identity,
        peer: &Identity,
    ) -> StoreResult<u64> {
        self.messages.mark_conversation_seen(viewer, peer).await
    }

    /// # Errors
    /// `NotFound` or `Forbidden` from the store.
    pub async fn delete(&self, actor: &Identity, message_id: Uuid) -> StoreResult<bool> {
        self.messages.delete(actor, message_id).await
    }

    /// Records a social interaction and pushes the notification.
    ///
    /// # Errors
    /// `Validation` for malformed or self-targeted interactions, `NotFound`
    /// for unknown recipients.
    #[instrument(name = "messaging.interact", skip(self, request), fields(to = %request.to_identity), err)]
    pub async fn interact(
        &self,
        sender: &Identity,
        request: InteractionRequest,
    ) -> StoreResult<Notification> {
        let new_notification = request
            .into_new_notification(sender.clone())
            .map_err(StoreError::Validation)?;

        self.require_known(&new_notification.recipient).await?;
        self.directory.ensure(sender).await?;

        let notification = self.notifications.create(new_notification).await?;
        let outcome = self.dispatcher.dispatch_notification(&notification).await;
        info!(
            notification_id = %notification.id,
            kind = notification.kind.as_str(),
            outcome = outcome.as_str(),
            "notification sent"
        );

        Ok(notification)
    }

    /// # Errors
    /// Propagates store failures.
    pub async fn notifications(&self, viewer: &Identity) -> StoreResult<Vec<Notification>> {
        self.notifications.list_and_mark_read(viewer).await
    }

    /// # Errors
    /// `Validation` for a blank display name.
    pub async fn upsert_profile(
        &self,
        identity: &Identity,
        request: UpsertProfileRequest,
    ) -> StoreResult<PublicProfile> {
        self.directory.upsert(identity, request).await
    }

    /// # Errors
    /// `NotFound` when the identity has no profile.
    pub async fn profile(&self, identity: &Identity) -> StoreResult<PublicProfile> {
        self.require_known(identity).await
    }

    /// Creates a placeholder profile for a stream owner on first connect.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn ensure_profile(&self, identity: &Identity) -> StoreResult<PublicProfile> {
        self.directory.ensure(identity).await
    }
}
