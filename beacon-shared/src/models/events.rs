use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Identity, Message, Notification, PublicProfile, Timestamp};

/// A message push frame: the message itself plus the sender snapshot needed
/// to render it without another request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageFrame {
    #[serde(flatten)]
    pub message: Message,
    pub sender_profile: PublicProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationFrame {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender_profile: PublicProfile,
}

/// First frame of every stream; ephemeral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionAck {
    pub handle_id: Uuid,
    pub identity: Identity,
    pub heartbeat_interval_ms: u64,
}

/// Last frame of a stream replaced by a newer one for the same identity.
/// Clients stop instead of reconnecting, so the newer stream keeps its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StreamSuperseded {
    pub handle_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Heartbeat {
    pub at: Timestamp,
}

/// Everything the server writes to a stream. The SSE `event:` field carries
/// [`PushEvent::event_name`] and `data:` carries the JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Connection(ConnectionAck),
    Message(MessageFrame),
    Notification(NotificationFrame),
    Ping(Heartbeat),
    Superseded(StreamSuperseded),
}

impl PushEvent {
    pub const CONNECTION: &'static str = "connection";
    pub const MESSAGE: &'static str = "message.new";
    pub const NOTIFICATION: &'static str = "notification.new";
    pub const PING: &'static str = "ping";
    pub const SUPERSEDED: &'static str = "superseded";

    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            PushEvent::Connection(_) => Self::CONNECTION,
            PushEvent::Message(_) => Self::MESSAGE,
            PushEvent::Notification(_) => Self::NOTIFICATION,
            PushEvent::Ping(_) => Self::PING,
            PushEvent::Superseded(_) => Self::SUPERSEDED,
        }
    }

    /// Serializes the payload written to the `data:` field.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn to_data(&self) -> serde_json::Result<String> {
        match self {
            PushEvent::Connection(ack) => serde_json::to_string(ack),
            PushEvent::Message(frame) => serde_json::to_string(frame),
            PushEvent::Notification(frame) => serde_json::to_string(frame),
            PushEvent::Ping(heartbeat) => serde_json::to_string(heartbeat),
            PushEvent::Superseded(notice) => serde_json::to_string(notice),
        }
    }

    /// Parses a received frame. Unknown event names yield `Ok(None)` so newer
    /// servers can add events without breaking older clients.
    ///
    /// # Errors
    /// Returns an error if a known event carries a malformed payload.
    pub fn decode(event: &str, data: &str) -> serde_json::Result<Option<Self>> {
        let event = match event {
            Self::CONNECTION => PushEvent::Connection(serde_json::from_str(data)?),
            Self::MESSAGE => PushEvent::Message(serde_json::from_str(data)?),
            Self::NOTIFICATION => PushEvent::Notification(serde_json::from_str(data)?),
            Self::PING => PushEvent::Ping(serde_json::from_str(data)?),
            Self::SUPERSEDED => PushEvent::Superseded(serde_json::from_str(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}
