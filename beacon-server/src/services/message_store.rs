use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use shared::models::{Identity, Message, NewMessage, Timestamp};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable message records. The store is the source of truth; pushes are a
/// best-effort shortcut on top of it.
#[async_trait]
pub trait MessageStore: Debug + Send + Sync {
    /// Persists a message, assigning id, `created_at`, and sequence.
    async fn create(&self, message: NewMessage) -> StoreResult<Message>;

    /// One page of the `{a, b}` conversation in ascending order. Page 1 holds
    /// the newest `limit` messages; higher pages walk back in time.
    async fn list_by_conversation(
        &self,
        a: &Identity,
        b: &Identity,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>>;

    /// Marks one message seen. Only its recipient may do so.
    async fn mark_seen(&self, viewer: &Identity, message_id: Uuid) -> StoreResult<Message>;

    /// Marks every unseen message from `peer` to `viewer` seen; returns the
    /// number updated.
    async fn mark_conversation_seen(&self, viewer: &Identity, peer: &Identity) -> StoreResult<u64>;

    /// Deletes a message. Only its sender may do so.
    async fn delete(&self, actor: &Identity, message_id: Uuid) -> StoreResult<bool>;

    /// Latest inbound message per sender, newest first.
    async fn recent_for(&self, identity: &Identity, limit: u32) -> StoreResult<Vec<Message>>;
}

pub type SharedMessageStore = Arc<dyn MessageStore>;

/// Offset window for a page counted back from the newest message.
pub(crate) fn page_window(total: usize, page: u32, limit: u32) -> (usize, usize) {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let skip = usize::try_from(page.saturating_sub(1))
        .unwrap_or(usize::MAX)
        .saturating_mul(limit);
    let end = total.saturating_sub(skip);
    let start = end.saturating_sub(limit);
    (start, end)
}

#[derive(Debug, Default)]
struct MemoryInner {
    messages: HashMap<Uuid, Message>,
    next_sequence: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    inner: RwLock<MemoryInner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewMessage) -> StoreResult<Message> {
        message.validate().map_err(StoreError::Validation)?;

        let mut guard = self.inner.write().await;
        guard.next_sequence += 1;
        let stored = Message {
            id: Uuid::new_v4(),
            from_identity: message.from,
            to_identity: message.to,
            body: message.body,
            kind: message.kind,
            created_at: Timestamp::now(),
            sequence: guard.next_sequence,
            seen: false,
        };
        guard.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_by_conversation(
        &self,
        a: &Identity,
        b: &Identity,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut conversation: Vec<&Message> = guard
            .messages
            .values()
            .filter(|m| m.belongs_to(a, b))
            .collect();
        conversation.sort_by_key(|m| m.ordering_key());

        let (start, end) = page_window(conversation.len(), page, limit);
        Ok(conversation[start..end].iter().map(|m| (*m).clone()).collect())
    }

    async fn mark_seen(&self, viewer: &Identity, message_id: Uuid) -> StoreResult<Message> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;

        if &message.to_identity != viewer {
            return Err(StoreError::Forbidden(
                "only the recipient can mark a message seen".into(),
            ));
        }

        message.seen = true;
        Ok(message.clone())
    }

    async fn mark_conversation_seen(&self, viewer: &Identity, peer: &Identity) -> StoreResult<u64> {
        let mut guard = self.inner.write().await;
        let mut updated = 0;
        for message in guard.messages.values_mut() {
            if &message.to_identity == viewer && &message.from_identity == peer && !message.seen {
                message.seen = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, actor: &Identity, message_id: Uuid) -> StoreResult<bool> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get(&message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;

        if &message.from_identity != actor {
            return Err(StoreError::Forbidden(
                "only the sender can delete a message".into(),
            ));
        }

        Ok(guard.messages.remove(&message_id).is_some())
    }

    async fn recent_for(&self, identity: &Identity, limit: u32) -> StoreResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut latest: HashMap<&Identity, &Message> = HashMap::new();
        for message in guard.messages.values() {
            if &message.to_identity != identity {
                continue;
            }
            latest
                .entry(&message.from_identity)
                .and_modify(|current| {
                    if message.ordering_key() > current.ordering_key() {
                        *current = message;
                    }
                })
                .or_insert(message);
        }

        let mut recent: Vec<Message> = latest.into_values().cloned().collect();
        recent.sort_by_key(|m| std::cmp::Reverse(m.ordering_key()));
        recent.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(recent)
    }
}
