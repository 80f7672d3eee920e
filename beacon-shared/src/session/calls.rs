use std::collections::HashMap;

use crate::models::{CallMode, Message, MessageKind};

/// Lifecycle of a call room as seen from the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoomEntry {
    state: RoomState,
    mode: CallMode,
}

/// Call-room states folded from typed message kinds.
///
/// Room ids are derived from the participant pair, so the same id is reused
/// by every call between two people. An invite reopens the room and a later
/// end marker closes it; the last marker in conversation order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRooms {
    rooms: HashMap<String, RoomEntry>,
}

impl CallRooms {
    /// Folds `messages`, which must already be in conversation order.
    pub fn fold<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut rooms = Self::default();
        for message in messages {
            rooms.apply(message);
        }
        rooms
    }

    /// Applies one message. Text and media messages never change room state,
    /// whatever their content.
    pub fn apply(&mut self, message: &Message) {
        match &message.kind {
            MessageKind::CallInvite { room_id, mode } => {
                self.rooms.insert(
                    room_id.clone(),
                    RoomEntry {
                        state: RoomState::Active,
                        mode: *mode,
                    },
                );
            }
            MessageKind::CallEnded { room_id, mode } => {
                self.rooms.insert(
                    room_id.clone(),
                    RoomEntry {
                        state: RoomState::Ended,
                        mode: *mode,
                    },
                );
            }
            MessageKind::Text | MessageKind::Media => {}
        }
    }

    /// `None` for rooms that never appeared in the conversation.
    #[must_use]
    pub fn state(&self, room_id: &str) -> Option<RoomState> {
        self.rooms.get(room_id).map(|entry| entry.state)
    }

    #[must_use]
    pub fn mode(&self, room_id: &str) -> Option<CallMode> {
        self.rooms.get(room_id).map(|entry| entry.mode)
    }

    /// Rooms whose latest marker is an invite.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.rooms
            .iter()
            .filter(|(_, entry)| entry.state == RoomState::Active)
            .map(|(room, _)| room.as_str())
    }
}

/// One-shot variant of [`CallRooms::state`] over an ordered slice.
#[must_use]
pub fn room_state(messages: &[Message], room_id: &str) -> Option<RoomState> {
    messages
        .iter()
        .rev()
        .find_map(|message| match &message.kind {
            MessageKind::CallInvite { room_id: room, .. } if room == room_id => {
                Some(RoomState::Active)
            }
            MessageKind::CallEnded { room_id: room, .. } if room == room_id => {
                Some(RoomState::Ended)
            }
            _ => None,
        })
}
