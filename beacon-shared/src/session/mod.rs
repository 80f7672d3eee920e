//! Client-side reconciliation of history fetches and pushed events.
//!
//! A [`ConversationSession`] belongs to one logged-in identity. It owns the
//! stream lifecycle and at most one open [`ConversationView`]; pushed events
//! either merge into that view or surface as a transient notification.

pub mod calls;
pub mod stream;
pub mod view;

pub use calls::{CallRooms, RoomState, room_state};
pub use stream::{Reconnect, ReconnectPolicy, StreamLifecycle, StreamState};
pub use view::{ConversationView, MergeOutcome};

use uuid::Uuid;

use crate::models::{Identity, Message, MessageFrame, NotificationFrame, PushEvent};

/// What a pushed event did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The server acknowledged the stream.
    Connected(Uuid),
    /// Merged into the open conversation at this index.
    Merged(usize),
    Duplicate,
    /// A newer stream for the same identity replaced this one. The lifecycle
    /// is closed; the caller should stop rather than reconnect.
    Superseded,
    /// A message for a conversation that is not open.
    NotifyMessage(Box<MessageFrame>),
    NotifyInteraction(Box<NotificationFrame>),
    Ignored,
}

#[derive(Debug)]
pub struct ConversationSession {
    viewer: Identity,
    view: Option<ConversationView>,
    lifecycle: StreamLifecycle,
}

impl ConversationSession {
    #[must_use]
    pub fn new(viewer: Identity, policy: ReconnectPolicy) -> Self {
        Self {
            viewer,
            view: None,
            lifecycle: StreamLifecycle::new(policy),
        }
    }

    #[must_use]
    pub fn viewer(&self) -> &Identity {
        &self.viewer
    }

    #[must_use]
    pub fn view(&self) -> Option<&ConversationView> {
        self.view.as_ref()
    }

    pub fn lifecycle(&mut self) -> &mut StreamLifecycle {
        &mut self.lifecycle
    }

    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        self.lifecycle.state()
    }

    /// Opens `peer`'s conversation with its full history, replacing any
    /// previously open view.
    pub fn open_conversation(&mut self, peer: Identity, history: Vec<Message>) -> &ConversationView {
        let mut view = ConversationView::new(self.viewer.clone(), peer);
        view.replace_history(history);
        self.view.insert(view)
    }

    /// Re-applies a history fetch to the open view, e.g. while polling.
    pub fn refresh(&mut self, history: Vec<Message>) {
        if let Some(view) = self.view.as_mut() {
            view.replace_history(history);
        }
    }

    /// Discards the local view; the stream stays as it is.
    pub fn close_conversation(&mut self) -> Option<ConversationView> {
        self.view.take()
    }

    pub fn handle_event(&mut self, event: PushEvent) -> SessionUpdate {
        match event {
            PushEvent::Connection(ack) => {
                self.lifecycle.opened();
                SessionUpdate::Connected(ack.handle_id)
            }
            PushEvent::Ping(_) => SessionUpdate::Ignored,
            PushEvent::Superseded(_) => {
                self.lifecycle.close();
                SessionUpdate::Superseded
            }
            PushEvent::Message(frame) => self.route_message(frame),
            PushEvent::Notification(frame) => {
                if frame.notification.recipient == self.viewer {
                    SessionUpdate::NotifyInteraction(Box::new(frame))
                } else {
                    SessionUpdate::Ignored
                }
            }
        }
    }

    fn route_message(&mut self, frame: MessageFrame) -> SessionUpdate {
        let message = &frame.message;
        if message.from_identity != self.viewer && message.to_identity != self.viewer {
            return SessionUpdate::Ignored;
        }

        let counterpart = message.counterpart(&self.viewer).clone();
        let outbound = message.is_outbound_for(&self.viewer);
        if let Some(view) = self.view.as_mut().filter(|v| v.peer() == &counterpart) {
            return match view.merge(frame.message) {
                MergeOutcome::Inserted(index) => SessionUpdate::Merged(index),
                MergeOutcome::Duplicate => SessionUpdate::Duplicate,
                MergeOutcome::ForeignConversation => SessionUpdate::Ignored,
            };
        }

        if outbound {
            SessionUpdate::Ignored
        } else {
            SessionUpdate::NotifyMessage(Box::new(frame))
        }
    }
}
