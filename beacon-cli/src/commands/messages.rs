use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use shared::{
    models::{
        CallAction, CallMode, CallSignal, HistoryQuery, Identity, SendMessageRequest,
        call_room_id,
    },
    session::CallRooms,
};

use super::ConnectionArgs;
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CallModeArg {
    Voice,
    Video,
}

impl From<CallModeArg> for CallMode {
    fn from(value: CallModeArg) -> Self {
        match value {
            CallModeArg::Voice => CallMode::Voice,
            CallModeArg::Video => CallMode::Video,
        }
    }
}

#[derive(Args, Debug)]
#[command(about = "Send a direct message")]
pub struct SendArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Recipient identity
    pub to: String,

    /// Message text
    pub text: Option<String>,

    /// Media URL to attach
    #[arg(long)]
    pub media: Option<String>,

    /// Start a call in the shared room instead of sending text
    #[arg(long, value_enum, conflicts_with = "end_call")]
    pub call: Option<CallModeArg>,

    /// End the call in the shared room
    #[arg(long, value_enum)]
    pub end_call: Option<CallModeArg>,
}

impl SendArgs {
    fn into_request(self, from: &Identity) -> Result<SendMessageRequest> {
        let to = Identity::from(self.to);
        let call = match (self.call, self.end_call) {
            (Some(mode), _) => Some((mode, CallAction::Invite)),
            (None, Some(mode)) => Some((mode, CallAction::End)),
            (None, None) => None,
        }
        .map(|(mode, action)| CallSignal {
            room_id: call_room_id(from, &to),
            mode: mode.into(),
            action,
        });

        if self.text.is_none() && self.media.is_none() && call.is_none() {
            bail!("nothing to send: pass text, --media, --call, or --end-call");
        }

        Ok(SendMessageRequest {
            to_identity: to,
            text: self.text,
            media: self.media,
            call,
        })
    }
}

#[derive(Args, Debug)]
#[command(about = "Show one page of a conversation, oldest first")]
pub struct HistoryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// The other party
    pub peer: String,

    /// Page number; 1 is the newest page
    #[arg(long)]
    pub page: Option<u32>,

    /// Messages per page
    #[arg(long)]
    pub limit: Option<u32>,

    /// Also mark the peer's messages as seen
    #[arg(long)]
    pub mark_seen: bool,
}

#[derive(Args, Debug)]
#[command(about = "Show the latest message from each sender")]
pub struct RecentArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// # Errors
/// Returns an error if the request is empty or the server rejects it.
pub async fn send(args: SendArgs) -> Result<()> {
    let (_, client) = args.connection.connect()?;
    let request = args.into_request(client.identity())?;
    let message = client.send(&request).await?;
    println!("{}", render::message_line(client.identity(), &message));
    Ok(())
}

/// # Errors
/// Returns an error if the server rejects the request.
pub async fn history(args: HistoryArgs) -> Result<()> {
    let (_, client) = args.connection.connect()?;
    let peer = Identity::from(args.peer);
    let query = HistoryQuery {
        page: args.page,
        limit: args.limit,
    };

    let messages = client.history(&peer, query).await?;
    if messages.is_empty() {
        println!("No messages with {peer}.");
        return Ok(());
    }

    for message in &messages {
        println!("{}", render::message_line(client.identity(), message));
    }

    let rooms = CallRooms::fold(&messages);
    let mut active: Vec<&str> = rooms.active().collect();
    active.sort_unstable();
    for room in active {
        println!("{}", render::room_line(room, shared::session::RoomState::Active));
    }

    if args.mark_seen {
        let updated = client.mark_conversation_seen(&peer).await?;
        println!("Marked {updated} message(s) from {peer} as seen.");
    }
    Ok(())
}

/// # Errors
/// Returns an error if the server rejects the request.
pub async fn recent(args: RecentArgs) -> Result<()> {
    let (_, client) = args.connection.connect()?;
    let messages = client.recent().await?;
    if messages.is_empty() {
        println!("No messages yet.");
    }
    for message in &messages {
        println!("{}", render::message_line(client.identity(), message));
    }
    Ok(())
}
