use std::collections::HashSet;

use uuid::Uuid;

use super::calls::{self, CallRooms, RoomState};
use crate::models::{Identity, Message, Timestamp};

/// Result of merging a single pushed message into a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Inserted at this index.
    Inserted(usize),
    Duplicate,
    ForeignConversation,
}

/// Ordered, de-duplicated message list for one `(viewer, peer)` conversation.
#[derive(Debug, Clone)]
pub struct ConversationView {
    viewer: Identity,
    peer: Identity,
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

fn sort_key(message: &Message) -> (Timestamp, i64, Uuid) {
    let (created_at, sequence) = message.ordering_key();
    (created_at, sequence, message.id)
}

impl ConversationView {
    pub fn new(viewer: Identity, peer: Identity) -> Self {
        Self {
            viewer,
            peer,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    #[must_use]
    pub fn viewer(&self) -> &Identity {
        &self.viewer
    }

    #[must_use]
    pub fn peer(&self) -> &Identity {
        &self.peer
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    /// Replaces the view with a freshly fetched history. Messages outside the
    /// conversation and repeated ids are dropped.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        let mut ids = HashSet::with_capacity(history.len());
        let mut messages: Vec<Message> = history
            .into_iter()
            .filter(|m| m.belongs_to(&self.viewer, &self.peer))
            .filter(|m| ids.insert(m.id))
            .collect();
        messages.sort_by_key(sort_key);

        self.messages = messages;
        self.ids = ids;
    }

    /// Inserts a pushed message at its ordered position. Merging the same
    /// message twice leaves the view unchanged.
    pub fn merge(&mut self, message: Message) -> MergeOutcome {
        if !message.belongs_to(&self.viewer, &self.peer) {
            return MergeOutcome::ForeignConversation;
        }
        if self.ids.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }

        let key = sort_key(&message);
        let index = self
            .messages
            .binary_search_by(|probe| sort_key(probe).cmp(&key))
            .unwrap_or_else(|insert_at| insert_at);

        self.ids.insert(message.id);
        self.messages.insert(index, message);
        MergeOutcome::Inserted(index)
    }

    /// Removes a message, e.g. after the sender deleted it.
    pub fn remove(&mut self, id: &Uuid) -> Option<Message> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Whether the viewer sent the message.
    #[must_use]
    pub fn is_mine(&self, message: &Message) -> bool {
        message.is_outbound_for(&self.viewer)
    }

    #[must_use]
    pub fn room_state(&self, room_id: &str) -> Option<RoomState> {
        calls::room_state(&self.messages, room_id)
    }

    #[must_use]
    pub fn call_rooms(&self) -> CallRooms {
        CallRooms::fold(&self.messages)
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageBody, MessageKind};
    use chrono::{Duration, TimeZone, Utc};

    fn msg(from: &str, to: &str, second: i64, sequence: i64) -> Message {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        Message {
            id: Uuid::new_v4(),
            from_identity: Identity::from(from),
            to_identity: Identity::from(to),
            body: MessageBody::text(format!("#{sequence}")),
            kind: MessageKind::Text,
            created_at: Timestamp(base + Duration::seconds(second)),
            sequence,
            seen: false,
        }
    }

    fn view() -> ConversationView {
        ConversationView::new(Identity::from("alice"), Identity::from("bob"))
    }

    fn sequences(view: &ConversationView) -> Vec<i64> {
        view.messages().iter().map(|m| m.sequence).collect()
    }

    #[test]
    fn merge_is_idempotent() {
        let mut view = view();
        let m = msg("bob", "alice", 1, 1);

        assert_eq!(view.merge(m.clone()), MergeOutcome::Inserted(0));
        assert_eq!(view.merge(m), MergeOutcome::Duplicate);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn merge_orders_regardless_of_arrival() {
        let a = msg("alice", "bob", 1, 1);
        let b = msg("bob", "alice", 2, 2);
        let c = msg("alice", "bob", 3, 3);

        let mut forward = view();
        for m in [a.clone(), b.clone(), c.clone()] {
            forward.merge(m);
        }
        let mut shuffled = view();
        for m in [c, a, b] {
            shuffled.merge(m);
        }

        assert_eq!(sequences(&forward), vec![1, 2, 3]);
        assert_eq!(sequences(&shuffled), vec![1, 2, 3]);
    }

    #[test]
    fn equal_timestamps_order_by_sequence() {
        let mut view = view();
        view.merge(msg("alice", "bob", 5, 8));
        view.merge(msg("bob", "alice", 5, 7));
        assert_eq!(sequences(&view), vec![7, 8]);
    }

    #[test]
    fn foreign_message_is_not_merged() {
        let mut view = view();
        assert_eq!(
            view.merge(msg("carol", "alice", 1, 1)),
            MergeOutcome::ForeignConversation
        );
        assert!(view.is_empty());
    }

    #[test]
    fn replace_history_sorts_and_dedups() {
        let mut view = view();
        view.merge(msg("bob", "alice", 100, 100));

        let first = msg("alice", "bob", 1, 1);
        let second = msg("bob", "alice", 2, 2);
        view.replace_history(vec![
            second.clone(),
            first.clone(),
            second.clone(),
            msg("carol", "bob", 3, 3),
        ]);

        assert_eq!(sequences(&view), vec![1, 2]);
        assert!(view.contains(&first.id));
        assert_eq!(view.merge(second), MergeOutcome::Duplicate);
    }

    #[test]
    fn sidedness_follows_sender() {
        let view = view();
        assert!(view.is_mine(&msg("alice", "bob", 1, 1)));
        assert!(!view.is_mine(&msg("bob", "alice", 1, 1)));
    }

    #[test]
    fn remove_drops_message_and_id() {
        let mut view = view();
        let m = msg("alice", "bob", 1, 1);
        view.merge(m.clone());

        assert_eq!(view.remove(&m.id).map(|r| r.id), Some(m.id));
        assert!(view.is_empty());
        assert_eq!(view.merge(m), MergeOutcome::Inserted(0));
    }
}
