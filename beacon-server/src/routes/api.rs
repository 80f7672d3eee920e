use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};

use crate::{
    app_state::SharedAppState,
    handlers::{messages, notifications, profiles, streaming},
    middleware::auth::{IdentityState, require_identity},
};

/// Routes mounted under `/api`. Every one of them needs a verified identity.
pub fn create_router_api(identity: IdentityState) -> Router<SharedAppState> {
    Router::new()
        .route("/stream", get(streaming::open_stream))
        .route("/messages", post(messages::send_message))
        .route("/messages/recent", get(messages::recent_messages))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/seen", post(messages::mark_seen))
        .route(
            "/conversations/{peer}/messages",
            get(messages::conversation_history),
        )
        .route(
            "/conversations/{peer}/seen",
            post(messages::mark_conversation_seen),
        )
        .route("/interactions", post(notifications::create_interaction))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/profiles/me",
            put(profiles::upsert_my_profile).get(profiles::my_profile),
        )
        .route("/profiles/{identity}", get(profiles::get_profile))
        .route_layer(from_fn_with_state(identity, require_identity))
}
