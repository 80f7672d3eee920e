use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use shared::models::{Identity, NewNotification, Notification, Timestamp};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::message_store::StoreResult;

#[async_trait]
pub trait NotificationStore: Debug + Send + Sync {
    async fn create(&self, notification: NewNotification) -> StoreResult<Notification>;

    /// Lists the recipient's notifications newest first and marks them read.
    /// The returned records keep their read flag from before the call.
    async fn list_and_mark_read(&self, recipient: &Identity) -> StoreResult<Vec<Notification>>;
}

pub type SharedNotificationStore = Arc<dyn NotificationStore>;

#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: NewNotification) -> StoreResult<Notification> {
        let stored = Notification {
            id: Uuid::new_v4(),
            recipient: notification.recipient,
            sender: notification.sender,
            kind: notification.kind,
            post_id: notification.post_id,
            text: notification.text,
            read: false,
            created_at: Timestamp::now(),
        };
        self.notifications.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_and_mark_read(&self, recipient: &Identity) -> StoreResult<Vec<Notification>> {
        let mut guard = self.notifications.write().await;
        let mut listed = Vec::new();
        // Insertion order is creation order; walk backwards for newest first.
        for notification in guard.iter_mut().rev() {
            if &notification.recipient == recipient {
                listed.push(notification.clone());
                notification.read = true;
            }
        }
        Ok(listed)
    }
}
