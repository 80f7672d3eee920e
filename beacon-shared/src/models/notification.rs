use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Identity, Timestamp};

/// Social interaction that produces a notification for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Like,
    Comment,
    Follow,
    ConnectionRequest,
}

impl InteractionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Comment => "comment",
            InteractionKind::Follow => "follow",
            InteractionKind::ConnectionRequest => "connection_request",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "like" => Some(InteractionKind::Like),
            "comment" => Some(InteractionKind::Comment),
            "follow" => Some(InteractionKind::Follow),
            "connection_request" => Some(InteractionKind::ConnectionRequest),
            _ => None,
        }
    }

    /// Likes and comments refer to a post; follows and connection requests don't.
    #[must_use]
    pub fn requires_post(self) -> bool {
        matches!(self, InteractionKind::Like | InteractionKind::Comment)
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A stored notification addressed to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Identity,
    pub sender: Identity,
    pub kind: InteractionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub read: bool,
    pub created_at: Timestamp,
}

/// Input to the notification store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient: Identity,
    pub sender: Identity,
    pub kind: InteractionKind,
    pub post_id: Option<String>,
    pub text: Option<String>,
}

/// Body of `POST /api/interactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InteractionRequest {
    pub to_identity: Identity,
    pub kind: InteractionKind,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl InteractionRequest {
    /// Builds the notification raised by `sender`.
    ///
    /// # Errors
    /// Returns a reason when the interaction targets the sender or misses a
    /// required post reference.
    pub fn into_new_notification(self, sender: Identity) -> Result<NewNotification, String> {
        if self.to_identity.is_blank() {
            return Err("recipient identity is required".into());
        }
        if self.to_identity == sender {
            return Err("cannot notify yourself".into());
        }

        let post_id = self.post_id.filter(|p| !p.trim().is_empty());
        if self.kind.requires_post() && post_id.is_none() {
            return Err(format!("{} interactions require a post_id", self.kind));
        }

        Ok(NewNotification {
            recipient: self.to_identity,
            sender,
            kind: self.kind,
            post_id,
            text: self.text.filter(|t| !t.trim().is_empty()),
        })
    }
}
