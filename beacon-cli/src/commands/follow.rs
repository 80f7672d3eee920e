//! Live view of the caller's stream.
//!
//! Runs a [`ConversationSession`]: the optional peer conversation is loaded
//! from history, pushed messages for it are merged in order, and everything
//! else is printed as a notification. Dropped streams reconnect with backoff;
//! once attempts run out the command polls history until the next round.

use std::{collections::HashSet, num::NonZeroUsize, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use futures_util::StreamExt;
use shared::{
    models::{HistoryQuery, Identity, MessageKind, PushEvent},
    session::{ConversationSession, Reconnect, ReconnectPolicy, SessionUpdate},
};
use tracing::{debug, warn};

use super::ConnectionArgs;
use crate::{client::ApiClient, render, sse::SseDecoder};

#[derive(Args, Debug)]
#[command(about = "Follow incoming messages and notifications")]
pub struct FollowArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Open this conversation and keep it in order as messages arrive
    #[arg(long)]
    pub peer: Option<String>,

    /// Exit after this many messages or notifications
    #[arg(long)]
    pub max_events: Option<NonZeroUsize>,
}

#[derive(Debug)]
enum StreamEnd {
    /// The event budget is spent.
    Done,
    /// The server closed the stream.
    Dropped,
    /// Another session for the same identity took the stream over.
    Superseded,
    Interrupted,
}

/// Counts down the optional event budget.
#[derive(Debug)]
struct Budget(Option<usize>);

impl Budget {
    fn new(limit: Option<NonZeroUsize>) -> Self {
        Self(limit.map(NonZeroUsize::get))
    }

    /// Records `events` delivered events; true once the budget is spent.
    fn spend(&mut self, events: usize) -> bool {
        match self.0.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(events);
                *remaining == 0
            }
            None => false,
        }
    }
}

/// # Errors
/// Returns an error if the initial history fetch fails.
pub async fn follow(args: FollowArgs) -> Result<()> {
    let (config, client) = args.connection.connect()?;
    let poll_interval = Duration::from_millis(config.client.poll_interval_ms);
    let mut session =
        ConversationSession::new(client.identity().clone(), ReconnectPolicy::from(&config.client));
    let mut budget = Budget::new(args.max_events);

    if let Some(peer) = args.peer {
        let history = client
            .history(&Identity::from(peer.as_str()), HistoryQuery::default())
            .await?;
        let view = session.open_conversation(Identity::from(peer), history);
        for message in view.messages() {
            println!("{}", render::message_line(client.identity(), message));
        }
    }

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        session.lifecycle().connecting();
        let outcome = tokio::select! {
            _ = &mut interrupt => Ok(StreamEnd::Interrupted),
            outcome = run_stream(&client, &mut session, &mut budget) => outcome,
        };

        match outcome {
            Ok(StreamEnd::Done) => return Ok(()),
            Ok(StreamEnd::Interrupted) => {
                session.lifecycle().close();
                return Ok(());
            }
            Ok(StreamEnd::Superseded) => {
                eprintln!(
                    "stream superseded by a newer session for {}; stopping",
                    client.identity()
                );
                return Ok(());
            }
            Ok(StreamEnd::Dropped) => warn!("stream closed by server"),
            Err(err) => warn!(error = %err, "stream failed"),
        }

        let (wait, paused) = match session.lifecycle().failed() {
            Reconnect::Retry(delay) => {
                eprintln!("reconnecting in {:.1}s", delay.as_secs_f64());
                (delay, false)
            }
            Reconnect::Pause => {
                eprintln!(
                    "live updates paused; checking history again in {}s",
                    poll_interval.as_secs()
                );
                (poll_interval, true)
            }
        };

        tokio::select! {
            _ = &mut interrupt => {
                session.lifecycle().close();
                return Ok(());
            }
            () = tokio::time::sleep(wait) => {}
        }

        if paused {
            let recovered = catch_up(&client, &mut session).await;
            if budget.spend(recovered) {
                return Ok(());
            }
            session.lifecycle().resume();
        }
    }
}

async fn run_stream(
    client: &ApiClient,
    session: &mut ConversationSession,
    budget: &mut Budget,
) -> Result<StreamEnd> {
    let response = client.open_stream().await?;
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("stream read failed")?;
        for frame in decoder.push(&chunk) {
            let event = match PushEvent::decode(&frame.event, &frame.data) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(event = %frame.event, "ignoring unknown event");
                    continue;
                }
                Err(err) => {
                    warn!(event = %frame.event, error = %err, "malformed frame");
                    continue;
                }
            };

            match session.handle_event(event) {
                SessionUpdate::Connected(handle_id) => {
                    eprintln!("connected ({handle_id})");
                    // Anything sent before the stream was registered was never
                    // pushed; history is the only place to find it.
                    let recovered = catch_up(client, session).await;
                    if budget.spend(recovered) {
                        return Ok(StreamEnd::Done);
                    }
                }
                SessionUpdate::Superseded => return Ok(StreamEnd::Superseded),
                update => {
                    if report(client.identity(), session, update) && budget.spend(1) {
                        return Ok(StreamEnd::Done);
                    }
                }
            }
        }
    }

    Ok(StreamEnd::Dropped)
}

/// Prints an update. Returns whether it counts as a delivered event.
fn report(viewer: &Identity, session: &ConversationSession, update: SessionUpdate) -> bool {
    match update {
        SessionUpdate::Merged(index) => {
            let Some(message) = session.view().and_then(|view| view.messages().get(index)) else {
                return false;
            };
            println!("{}", render::message_line(viewer, message));
            if let Some(room_id) = message.kind.room_id()
                && let Some(state) = session.view().and_then(|view| view.room_state(room_id))
            {
                println!("{}", render::room_line(room_id, state));
            }
            true
        }
        SessionUpdate::NotifyMessage(frame) => {
            let message = &frame.message;
            let label = match message.kind {
                MessageKind::CallInvite { .. } => "incoming call",
                _ => "new message",
            };
            println!(
                "{label} from {}: {}",
                frame.sender_profile.display_name,
                render::message_body(message)
            );
            true
        }
        SessionUpdate::NotifyInteraction(frame) => {
            println!(
                "{}",
                render::notification_line(&frame.notification, Some(&frame.sender_profile))
            );
            true
        }
        SessionUpdate::Connected(_)
        | SessionUpdate::Superseded
        | SessionUpdate::Duplicate
        | SessionUpdate::Ignored => false,
    }
}

/// Refetches the open conversation and prints what the stream missed.
/// Returns how many messages were new.
async fn catch_up(client: &ApiClient, session: &mut ConversationSession) -> usize {
    let Some(peer) = session.view().map(|view| view.peer().clone()) else {
        return 0;
    };

    let history = match client.history(&peer, HistoryQuery::default()).await {
        Ok(history) => history,
        Err(err) => {
            warn!(peer = %peer, error = %err, "history refresh failed");
            return 0;
        }
    };

    let known: HashSet<_> = session
        .view()
        .map(|view| view.messages().iter().map(|m| m.id).collect())
        .unwrap_or_default();
    session.refresh(history);

    let Some(view) = session.view() else {
        return 0;
    };
    let mut recovered = 0;
    for message in view.messages().iter().filter(|m| !known.contains(&m.id)) {
        println!("{}", render::message_line(client.identity(), message));
        recovered += 1;
    }
    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use server::{app_state::AppState, server::serve_with_shutdown, services::ChannelRegistry};
    use shared::{
        config::server::Config,
        models::{
            Message, MessageBody, MessageFrame, PublicProfile, SendMessageRequest, Timestamp,
            UpsertProfileRequest,
        },
        session::StreamState,
    };
    use std::{net::SocketAddr, sync::Arc};
    use tokio::{net::TcpListener, time::timeout};
    use uuid::Uuid;

    async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::in_memory(Arc::new(Config::default())));
        for (identity, name) in [("alice", "Alice"), ("bob", "Bob")] {
            state
                .messaging()
                .upsert_profile(
                    &Identity::from(identity),
                    UpsertProfileRequest {
                        display_name: name.into(),
                        username: None,
                        avatar_url: None,
                    },
                )
                .await
                .unwrap();
        }
        tokio::spawn(serve_with_shutdown(
            listener,
            Arc::clone(&state),
            std::future::pending(),
        ));
        (addr, state)
    }

    fn client_for(addr: SocketAddr, identity: &str) -> ApiClient {
        ApiClient::new(
            &format!("http://{addr}"),
            Identity::from(identity),
            "x-beacon-identity",
        )
        .unwrap()
    }

    async fn registered_handle(state: &AppState, identity: &Identity) -> Uuid {
        for _ in 0..200 {
            if let Some(handle) = state.registry().lookup(identity).await {
                return handle.id();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{identity} never registered a stream");
    }

    fn frame(from: &str, to: &str, text: &str) -> MessageFrame {
        MessageFrame {
            message: Message {
                id: Uuid::new_v4(),
                from_identity: from.into(),
                to_identity: to.into(),
                body: MessageBody::text(text),
                kind: MessageKind::Text,
                created_at: Timestamp::now(),
                sequence: 1,
                seen: false,
            },
            sender_profile: PublicProfile::placeholder(&from.into()),
        }
    }

    #[test]
    fn budget_counts_down_to_done() {
        let mut budget = Budget::new(NonZeroUsize::new(3));
        assert!(!budget.spend(0));
        assert!(!budget.spend(1));
        assert!(budget.spend(2));

        let mut unlimited = Budget::new(None);
        assert!(!unlimited.spend(5));
    }

    #[test]
    fn merged_and_routed_messages_count_as_events() {
        let viewer = Identity::from("bob");
        let mut session = ConversationSession::new(viewer.clone(), ReconnectPolicy::default());
        session.open_conversation("alice".into(), Vec::new());

        let merged = session.handle_event(PushEvent::Message(frame("alice", "bob", "hi")));
        assert!(matches!(merged, SessionUpdate::Merged(0)));
        assert!(report(&viewer, &session, merged));

        let elsewhere = session.handle_event(PushEvent::Message(frame("carol", "bob", "yo")));
        assert!(matches!(elsewhere, SessionUpdate::NotifyMessage(_)));
        assert!(report(&viewer, &session, elsewhere));

        assert!(!report(&viewer, &session, SessionUpdate::Ignored));
        assert_eq!(session.view().map(|v| v.len()), Some(1));
    }

    #[tokio::test]
    async fn first_connection_recovers_message_sent_before_stream_opened() {
        let (addr, state) = spawn_server().await;
        let bob = client_for(addr, "bob");
        let alice = Identity::from("alice");

        let mut session = ConversationSession::new(bob.identity().clone(), ReconnectPolicy::default());
        let history = bob.history(&alice, HistoryQuery::default()).await.unwrap();
        assert!(history.is_empty());
        session.open_conversation(alice.clone(), history);

        // No stream is registered yet, so this is stored but never pushed.
        state
            .messaging()
            .send(
                &alice,
                SendMessageRequest {
                    to_identity: Identity::from("bob"),
                    text: Some("sent while you were connecting".into()),
                    ..SendMessageRequest::default()
                },
            )
            .await
            .unwrap();

        let mut budget = Budget::new(NonZeroUsize::new(1));
        let end = timeout(Duration::from_secs(10), run_stream(&bob, &mut session, &mut budget))
            .await
            .expect("catch-up should spend the budget")
            .unwrap();

        assert!(matches!(end, StreamEnd::Done), "{end:?}");
        let view = session.view().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(
            view.messages()[0].body.text.as_deref(),
            Some("sent while you were connecting")
        );
    }

    #[tokio::test]
    async fn superseded_stream_stops_without_reconnecting() {
        let (addr, state) = spawn_server().await;
        let bob = client_for(addr, "bob");
        let identity = Identity::from("bob");
        let mut session = ConversationSession::new(identity.clone(), ReconnectPolicy::default());
        let mut budget = Budget::new(None);

        let takeover = async {
            let first = registered_handle(&state, &identity).await;
            let newer = bob.open_stream().await.unwrap();
            let current = state.registry().lookup(&identity).await.unwrap();
            assert_ne!(current.id(), first);
            (newer, current.id())
        };

        let (end, (newer, newer_id)) = tokio::join!(
            timeout(Duration::from_secs(10), run_stream(&bob, &mut session, &mut budget)),
            takeover
        );

        let end = end.expect("superseded stream should end").unwrap();
        assert!(matches!(end, StreamEnd::Superseded), "{end:?}");
        assert_eq!(session.stream_state(), StreamState::Closed);

        let active = state.registry().lookup(&identity).await.unwrap();
        assert_eq!(active.id(), newer_id);
        assert!(active.is_open());
        drop(newer);
    }
}
