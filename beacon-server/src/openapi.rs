#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    CallAction, CallMode, CallSignal, ConnectionAck, Heartbeat, HistoryQuery, Identity,
    InteractionKind, InteractionRequest, Message, MessageBody, MessageFrame, MessageKind,
    Notification, NotificationFrame, PublicProfile, RecentMessagesResponse, SeenResponse,
    SendMessageRequest, StreamSuperseded, Timestamp, UpsertProfileRequest,
};
use utoipa::OpenApi;

use crate::http::problem::ProblemDetails;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Beacon API",
        version = "1.0.0",
        description = "Message delivery and notification push over server-sent events"
    ),
    paths(
        crate::handlers::streaming::open_stream,
        crate::handlers::messages::send_message,
        crate::handlers::messages::conversation_history,
        crate::handlers::messages::mark_conversation_seen,
        crate::handlers::messages::recent_messages,
        crate::handlers::messages::mark_seen,
        crate::handlers::messages::delete_message,
        crate::handlers::notifications::create_interaction,
        crate::handlers::notifications::list_notifications,
        crate::handlers::profiles::upsert_my_profile,
        crate::handlers::profiles::my_profile,
        crate::handlers::profiles::get_profile,
    ),
    components(
        schemas(
            Identity,
            Timestamp,
            Message,
            MessageBody,
            MessageKind,
            CallMode,
            CallAction,
            CallSignal,
            SendMessageRequest,
            HistoryQuery,
            RecentMessagesResponse,
            SeenResponse,
            InteractionKind,
            InteractionRequest,
            Notification,
            PublicProfile,
            UpsertProfileRequest,
            ConnectionAck,
            Heartbeat,
            MessageFrame,
            NotificationFrame,
            StreamSuperseded,
            ProblemDetails,
        )
    ),
    tags(
        (name = "Streams", description = "Per-identity push stream"),
        (name = "Messages", description = "Direct messages and call markers"),
        (name = "Notifications", description = "Social interaction notifications"),
        (name = "Profiles", description = "Public profile directory")
    )
)]
pub struct ApiDoc;
