use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures_util::{Stream, StreamExt, future, stream};
use shared::models::{ConnectionAck, Identity, PushEvent, StreamSuperseded};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    app_state::SharedAppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::CurrentIdentity,
    services::{
        registry::SharedRegistry,
        stream_supervisor::{HandleState, StreamHandle},
    },
};

/// Unregisters and closes the handle once the response body is dropped,
/// whether the client went away or the stream was superseded.
struct StreamGuard {
    handle: Arc<StreamHandle>,
    registry: SharedRegistry,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.handle.close();
        let registry = Arc::clone(&self.registry);
        let identity: Identity = self.handle.identity().clone();
        let handle_id = self.handle.id();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                registry.unregister(&identity, handle_id).await;
            });
        }
        info!(identity = %self.handle.identity(), handle_id = %handle_id, "stream closed");
    }
}

fn to_sse_event(event: &PushEvent) -> Event {
    match event.to_data() {
        Ok(data) => Event::default().event(event.event_name()).data(data),
        Err(err) => {
            warn!(error = %err, event = event.event_name(), "failed to encode push frame");
            Event::default().comment("encode-error")
        }
    }
}

/// Evaluated once the live part of a stream has ended. A superseded handle
/// gets a final `superseded` frame; any other close ends silently.
fn farewell(handle: Arc<StreamHandle>) -> impl Stream<Item = PushEvent> {
    stream::once(async move {
        (handle.state() == HandleState::Superseded).then(|| {
            PushEvent::Superseded(StreamSuperseded {
                handle_id: handle.id(),
            })
        })
    })
    .filter_map(future::ready)
}

/// Opens the caller's push stream. A newer stream for the same identity
/// supersedes this one and ends it with a `superseded` frame.
#[utoipa::path(
    get,
    path = "/api/stream",
    responses(
        (status = 200, description = "Server-sent event stream of push frames", content_type = "text/event-stream"),
        (status = 401, description = "Missing identity", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Streams"
)]
pub async fn open_stream(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    state.messaging().ensure_profile(&identity).await?;

    let stream_config = &state.config().stream;
    let (handle, receiver) = StreamHandle::open(identity.clone(), stream_config.channel_capacity);

    let heartbeat_interval_ms =
        u64::try_from(state.supervisor().heartbeat_interval().as_millis()).unwrap_or(u64::MAX);
    handle
        .write(PushEvent::Connection(ConnectionAck {
            handle_id: handle.id(),
            identity: identity.clone(),
            heartbeat_interval_ms,
        }))
        .map_err(|err| ApiError::internal_server_error(format!("stream setup failed: {err}")))?;

    state.registry().register(Arc::clone(&handle)).await;
    state.supervisor().spawn_heartbeat(Arc::clone(&handle));

    let cancelled = handle.cancellation_token().cancelled_owned();
    let tail = farewell(Arc::clone(&handle));
    let guard = StreamGuard {
        handle,
        registry: Arc::clone(state.registry()),
    };

    let stream = ReceiverStream::new(receiver)
        .take_until(cancelled)
        .chain(tail)
        .map(move |event| {
            let _held = &guard;
            Ok::<_, Infallible>(to_sse_event(&event))
        });

    Ok(Sse::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
    };
    use futures::StreamExt as _;
    use shared::{
        config::server::{Config, Profile},
        models::{SendMessageRequest, UpsertProfileRequest},
    };
    use std::time::Duration;
    use tokio::time::timeout;
    use tower::ServiceExt;

    use crate::middleware::auth::{IdentityState, require_identity};

    fn app(state: SharedAppState) -> Router {
        let identity_state = IdentityState::from_config(state.config());
        Router::new()
            .route("/api/stream", get(open_stream))
            .layer(from_fn_with_state(identity_state, require_identity))
            .with_state(state)
    }

    fn state() -> SharedAppState {
        Arc::new(AppState::in_memory(Arc::new(Config::default_for_profile(
            Profile::Test,
        ))))
    }

    async fn open(state: &SharedAppState, who: &str) -> axum::body::BodyDataStream {
        let response = app(Arc::clone(state))
            .oneshot(
                Request::builder()
                    .uri("/api/stream")
                    .header("x-beacon-identity", who)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.into_body().into_data_stream()
    }

    async fn read_until(body: &mut axum::body::BodyDataStream, needle: &str) -> String {
        let mut seen = String::new();
        while !seen.contains(needle) {
            let chunk = timeout(Duration::from_secs(2), body.next())
                .await
                .expect("frame before timeout")
                .expect("stream still open")
                .expect("readable chunk");
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
        seen
    }

    #[tokio::test]
    async fn first_frame_is_connection_ack() {
        let state = state();
        let mut body = open(&state, "bob").await;

        let text = read_until(&mut body, "\n\n").await;
        assert!(text.contains("event: connection"), "{text}");
        assert!(text.contains("\"identity\":\"bob\""), "{text}");
        assert!(state.registry().lookup(&Identity::from("bob")).await.is_some());
    }

    #[tokio::test]
    async fn pushed_message_reaches_open_stream() {
        let state = state();
        state
            .messaging()
            .upsert_profile(
                &Identity::from("alice"),
                UpsertProfileRequest {
                    display_name: "Alice".into(),
                    username: None,
                    avatar_url: None,
                },
            )
            .await
            .unwrap();

        let mut body = open(&state, "bob").await;
        read_until(&mut body, "event: connection").await;

        state
            .messaging()
            .send(
                &Identity::from("alice"),
                SendMessageRequest {
                    to_identity: Identity::from("bob"),
                    text: Some("hi".into()),
                    ..SendMessageRequest::default()
                },
            )
            .await
            .unwrap();

        let text = read_until(&mut body, "\"display_name\":\"Alice\"").await;
        assert!(text.contains("event: message.new"), "{text}");
        assert!(text.contains("\"from_identity\":\"alice\""), "{text}");
    }

    #[tokio::test]
    async fn second_stream_supersedes_first() {
        let state = state();
        let bob = Identity::from("bob");

        let mut first = open(&state, "bob").await;
        read_until(&mut first, "event: connection").await;
        let first_handle = state.registry().lookup(&bob).await.unwrap();

        let mut second = open(&state, "bob").await;
        read_until(&mut second, "event: connection").await;

        assert_eq!(first_handle.state(), HandleState::Superseded);
        let rest = timeout(Duration::from_secs(2), async {
            let mut rest = String::new();
            while let Some(chunk) = first.next().await {
                rest.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            }
            rest
        })
        .await
        .expect("superseded stream should end");
        assert!(rest.contains("event: superseded"), "{rest}");
        assert!(rest.contains(&first_handle.id().to_string()), "{rest}");

        let active = state.registry().lookup(&bob).await.unwrap();
        assert_ne!(active.id(), first_handle.id());
        assert!(active.is_open());
    }

    #[tokio::test]
    async fn closed_stream_ends_without_superseded_frame() {
        let state = state();
        let mut body = open(&state, "bob").await;
        read_until(&mut body, "event: connection").await;

        let handle = state.registry().lookup(&Identity::from("bob")).await.unwrap();
        assert!(handle.close());

        let rest = timeout(Duration::from_secs(2), async {
            let mut rest = String::new();
            while let Some(chunk) = body.next().await {
                rest.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            }
            rest
        })
        .await
        .expect("closed stream should end");
        assert!(!rest.contains("superseded"), "{rest}");
    }

    #[tokio::test]
    async fn missing_identity_is_rejected() {
        let response = app(state())
            .oneshot(Request::builder().uri("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
