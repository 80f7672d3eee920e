use std::collections::HashMap;

use anyhow::Result;
use clap::{Args, ValueEnum};
use shared::models::{Identity, InteractionKind, InteractionRequest, PublicProfile};
use tracing::debug;

use super::ConnectionArgs;
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InteractionArg {
    Like,
    Comment,
    Follow,
    ConnectionRequest,
}

impl From<InteractionArg> for InteractionKind {
    fn from(value: InteractionArg) -> Self {
        match value {
            InteractionArg::Like => InteractionKind::Like,
            InteractionArg::Comment => InteractionKind::Comment,
            InteractionArg::Follow => InteractionKind::Follow,
            InteractionArg::ConnectionRequest => InteractionKind::ConnectionRequest,
        }
    }
}

#[derive(Args, Debug)]
#[command(about = "List notifications, newest first, and mark them read")]
pub struct NotificationsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug)]
#[command(about = "Like, comment on, follow, or send a connection request")]
pub struct InteractArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Who receives the notification
    pub to: String,

    #[arg(value_enum)]
    pub kind: InteractionArg,

    /// Post the interaction refers to; required for likes and comments
    #[arg(long)]
    pub post: Option<String>,

    /// Comment text
    #[arg(long)]
    pub text: Option<String>,
}

/// # Errors
/// Returns an error if the server rejects the request.
pub async fn list(args: NotificationsArgs) -> Result<()> {
    let (_, client) = args.connection.connect()?;
    let notifications = client.notifications().await?;
    if notifications.is_empty() {
        println!("No notifications.");
        return Ok(());
    }

    let mut profiles: HashMap<Identity, Option<PublicProfile>> = HashMap::new();
    for notification in &notifications {
        if !profiles.contains_key(&notification.sender) {
            let profile = match client.profile(&notification.sender).await {
                Ok(profile) => Some(profile),
                Err(err) => {
                    debug!(sender = %notification.sender, error = %err, "profile lookup failed");
                    None
                }
            };
            profiles.insert(notification.sender.clone(), profile);
        }

        let sender = profiles.get(&notification.sender).and_then(Option::as_ref);
        println!("{}", render::notification_line(notification, sender));
    }
    Ok(())
}

/// # Errors
/// Returns an error if the server rejects the interaction.
pub async fn interact(args: InteractArgs) -> Result<()> {
    let (_, client) = args.connection.connect()?;
    let request = InteractionRequest {
        to_identity: Identity::from(args.to),
        kind: args.kind.into(),
        post_id: args.post,
        text: args.text,
    };
    let notification = client.interact(&request).await?;
    println!(
        "Sent {} to {} ({})",
        notification.kind, notification.recipient, notification.id
    );
    Ok(())
}
