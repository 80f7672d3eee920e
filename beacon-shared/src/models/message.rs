use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{Identity, Timestamp, call_room_id};

/// Marker older clients append to a plain text message when a call ends,
/// followed by the room id (`"... Call Ended||<room_id>"`).
const LEGACY_CALL_ENDED_MARKER: &str = "Call Ended||";

/// Media used by a call room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    Voice,
    Video,
}

impl CallMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "voice" => Some(CallMode::Voice),
            "video" => Some(CallMode::Video),
            _ => None,
        }
    }
}

impl Display for CallMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CallMode::Voice => write!(f, "voice"),
            CallMode::Video => write!(f, "video"),
        }
    }
}

/// What a message represents. Call signalling rides inside the message stream
/// as typed variants keyed by room id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Media,
    CallInvite { room_id: String, mode: CallMode },
    CallEnded { room_id: String, mode: CallMode },
}

impl MessageKind {
    /// Stable tag used for storage columns.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Media => "media",
            MessageKind::CallInvite { .. } => "call_invite",
            MessageKind::CallEnded { .. } => "call_ended",
        }
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        match self {
            MessageKind::CallInvite { room_id, .. } | MessageKind::CallEnded { room_id, .. } => {
                Some(room_id)
            }
            MessageKind::Text | MessageKind::Media => None,
        }
    }

    #[must_use]
    pub fn call_mode(&self) -> Option<CallMode> {
        match self {
            MessageKind::CallInvite { mode, .. } | MessageKind::CallEnded { mode, .. } => {
                Some(*mode)
            }
            MessageKind::Text | MessageKind::Media => None,
        }
    }

    /// Rebuilds a kind from its storage columns.
    #[must_use]
    pub fn from_parts(tag: &str, room_id: Option<String>, mode: Option<CallMode>) -> Option<Self> {
        match (tag, room_id) {
            ("text", _) => Some(MessageKind::Text),
            ("media", _) => Some(MessageKind::Media),
            ("call_invite", Some(room_id)) => Some(MessageKind::CallInvite {
                room_id,
                mode: mode.unwrap_or(CallMode::Video),
            }),
            ("call_ended", Some(room_id)) => Some(MessageKind::CallEnded {
                room_id,
                mode: mode.unwrap_or(CallMode::Video),
            }),
            _ => None,
        }
    }

    /// Recognises the legacy free-text call-ended sentinel sent from `from` to
    /// `to`. The room must be the pair's own room, so text naming any other
    /// room stays plain text. Only applied when a message is ingested; stored
    /// text is never scanned for markers.
    #[must_use]
    pub fn from_legacy_text(text: &str, from: &Identity, to: &Identity) -> Option<Self> {
        let (prefix, room_id) = text.split_once("||")?;
        if !text.contains(LEGACY_CALL_ENDED_MARKER) || !prefix.ends_with("Call Ended") {
            return None;
        }

        let room_id = room_id.trim();
        if room_id.is_empty() || room_id != call_room_id(from, to) {
            return None;
        }

        let mode = if prefix.contains("Voice") {
            CallMode::Voice
        } else {
            CallMode::Video
        };

        Some(MessageKind::CallEnded {
            room_id: room_id.to_string(),
            mode,
        })
    }
}

/// Text payload, media reference, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            media_url: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.media_url.as_deref().is_none_or(|m| m.trim().is_empty())
    }
}

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub from_identity: Identity,
    pub to_identity: Identity,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(flatten)]
    pub kind: MessageKind,
    pub created_at: Timestamp,
    /// Store insertion order; breaks ties between equal `created_at` values.
    pub sequence: i64,
    pub seen: bool,
}

impl Message {
    /// Total order of a conversation: `created_at`, then insertion sequence.
    #[must_use]
    pub fn ordering_key(&self) -> (Timestamp, i64) {
        (self.created_at, self.sequence)
    }

    /// A message is outbound for `viewer` exactly when the viewer sent it.
    #[must_use]
    pub fn is_outbound_for(&self, viewer: &Identity) -> bool {
        &self.from_identity == viewer
    }

    /// The other party of the conversation, seen from `viewer`.
    #[must_use]
    pub fn counterpart(&self, viewer: &Identity) -> &Identity {
        if self.is_outbound_for(viewer) {
            &self.to_identity
        } else {
            &self.from_identity
        }
    }

    /// Whether the message belongs to the unordered pair `{a, b}`.
    #[must_use]
    pub fn belongs_to(&self, a: &Identity, b: &Identity) -> bool {
        (&self.from_identity == a && &self.to_identity == b)
            || (&self.from_identity == b && &self.to_identity == a)
    }
}

/// Input to the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub from: Identity,
    pub to: Identity,
    pub body: MessageBody,
    pub kind: MessageKind,
}

impl NewMessage {
    /// Checks the body matches the kind.
    ///
    /// # Errors
    /// Returns a human readable reason when the message is malformed.
    pub fn validate(&self) -> Result<(), String> {
        if self.from.is_blank() || self.to.is_blank() {
            return Err("sender and recipient identities are required".into());
        }
        if self.from == self.to {
            return Err("cannot send a message to yourself".into());
        }

        match &self.kind {
            MessageKind::Text if self.body.text.as_deref().is_none_or(|t| t.trim().is_empty()) => {
                Err("text messages require a non-empty text body".into())
            }
            MessageKind::Media
                if self
                    .body
                    .media_url
                    .as_deref()
                    .is_none_or(|m| m.trim().is_empty()) =>
            {
                Err("media messages require a media reference".into())
            }
            MessageKind::CallInvite { room_id, .. } | MessageKind::CallEnded { room_id, .. }
                if room_id.trim().is_empty() =>
            {
                Err("call markers require a room id".into())
            }
            _ => Ok(()),
        }
    }
}

/// Whether a call signal opens or closes a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallAction {
    Invite,
    End,
}

/// Structured call signal attached to a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CallSignal {
    pub room_id: String,
    pub mode: CallMode,
    pub action: CallAction,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub to_identity: Identity,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub call: Option<CallSignal>,
}

impl SendMessageRequest {
    /// Resolves the message kind and body for a send from `from`.
    ///
    /// # Errors
    /// Returns a reason when the request carries neither text, media, nor a
    /// call signal, or when the resulting message fails validation.
    pub fn into_new_message(self, from: Identity) -> Result<NewMessage, String> {
        let text = self.text.filter(|t| !t.trim().is_empty());
        let media = self.media.filter(|m| !m.trim().is_empty());

        let kind = if let Some(call) = self.call {
            match call.action {
                CallAction::Invite => MessageKind::CallInvite {
                    room_id: call.room_id,
                    mode: call.mode,
                },
                CallAction::End => MessageKind::CallEnded {
                    room_id: call.room_id,
                    mode: call.mode,
                },
            }
        } else if media.is_some() {
            MessageKind::Media
        } else if let Some(text) = text.as_deref() {
            MessageKind::from_legacy_text(text, &from, &self.to_identity)
                .unwrap_or(MessageKind::Text)
        } else {
            return Err("message must carry text, media, or a call signal".into());
        };

        let message = NewMessage {
            from,
            to: self.to_identity,
            body: MessageBody {
                text,
                media_url: media,
            },
            kind,
        };
        message.validate()?;
        Ok(message)
    }
}

/// Pagination for conversation history. Pages start at 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl HistoryQuery {
    /// Returns `(page, limit)` with the page floored at 1 and the limit
    /// clamped to `1..=max_limit`.
    #[must_use]
    pub fn resolve(&self, max_limit: u32) -> (u32, u32) {
        let max_limit = max_limit.max(1);
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(max_limit).clamp(1, max_limit);
        (page, limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentMessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeenResponse {
    pub updated: u64,
}
