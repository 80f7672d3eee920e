//! Plain-text rendering for terminal output.

use shared::{
    models::{Identity, Message, MessageKind, Notification, PublicProfile},
    session::RoomState,
};

pub fn message_line(viewer: &Identity, message: &Message) -> String {
    let who = if message.is_outbound_for(viewer) {
        format!("you -> {}", message.to_identity)
    } else {
        message.from_identity.to_string()
    };
    let seen = if message.is_outbound_for(viewer) && message.seen {
        " (seen)"
    } else {
        ""
    };

    format!("[{}] {who}: {}{seen}", message.created_at, message_body(message))
}

pub fn message_body(message: &Message) -> String {
    match &message.kind {
        MessageKind::Text => message.body.text.clone().unwrap_or_default(),
        MessageKind::Media => {
            let media = message.body.media_url.as_deref().unwrap_or_default();
            match message.body.text.as_deref() {
                Some(caption) => format!("{caption} [media: {media}]"),
                None => format!("[media: {media}]"),
            }
        }
        MessageKind::CallInvite { room_id, mode } => format!("* {mode} call started ({room_id})"),
        MessageKind::CallEnded { room_id, mode } => format!("* {mode} call ended ({room_id})"),
    }
}

pub fn notification_line(notification: &Notification, sender: Option<&PublicProfile>) -> String {
    let name = sender.map_or_else(
        || notification.sender.to_string(),
        |profile| profile.display_name.clone(),
    );
    let marker = if notification.read { " " } else { "*" };
    let mut line = format!(
        "{marker} [{}] {name} {}",
        notification.created_at,
        describe_interaction(notification)
    );
    if let Some(text) = notification.text.as_deref() {
        line.push_str(": ");
        line.push_str(text);
    }
    line
}

fn describe_interaction(notification: &Notification) -> String {
    use shared::models::InteractionKind;

    let post = notification.post_id.as_deref().unwrap_or("a post");
    match notification.kind {
        InteractionKind::Like => format!("liked {post}"),
        InteractionKind::Comment => format!("commented on {post}"),
        InteractionKind::Follow => "started following you".to_string(),
        InteractionKind::ConnectionRequest => "sent you a connection request".to_string(),
    }
}

pub fn room_line(room_id: &str, state: RoomState) -> String {
    match state {
        RoomState::Active => format!("call {room_id} is active"),
        RoomState::Ended => format!("call {room_id} has ended"),
    }
}
