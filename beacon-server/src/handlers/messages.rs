use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use shared::models::{
    HistoryQuery, Identity, Message, RecentMessagesResponse, SeenResponse, SendMessageRequest,
};
use uuid::Uuid;

use crate::{
    app_state::SharedAppState, http::error::AppResult,
    middleware::request_context::CurrentIdentity,
};

/// Persists a message, then pushes it to the recipient if they have a stream
/// open. The response does not depend on the push.
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = Message),
        (status = 400, description = "Empty or malformed message", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "Unknown recipient", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Messages"
)]
pub async fn send_message(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = state.messaging().send(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{peer}/messages",
    params(("peer" = String, Path, description = "The other party"), HistoryQuery),
    responses(
        (status = 200, description = "One page of the conversation, oldest first", body = [Message])
    ),
    tag = "Messages"
)]
pub async fn conversation_history(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(peer): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = state
        .messaging()
        .history(&identity, &Identity::from(peer), query)
        .await?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{peer}/seen",
    params(("peer" = String, Path, description = "Sender whose messages were read")),
    responses((status = 200, description = "Messages marked seen", body = SeenResponse)),
    tag = "Messages"
)]
pub async fn mark_conversation_seen(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(peer): Path<String>,
) -> AppResult<Json<SeenResponse>> {
    let updated = state
        .messaging()
        .mark_conversation_seen(&identity, &Identity::from(peer))
        .await?;
    Ok(Json(SeenResponse { updated }))
}

#[utoipa::path(
    get,
    path = "/api/messages/recent",
    responses((status = 200, description = "Latest inbound message per sender", body = RecentMessagesResponse)),
    tag = "Messages"
)]
pub async fn recent_messages(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> AppResult<Json<RecentMessagesResponse>> {
    let messages = state.messaging().recent(&identity).await?;
    Ok(Json(RecentMessagesResponse { messages }))
}

#[utoipa::path(
    post,
    path = "/api/messages/{id}/seen",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked seen", body = Message),
        (status = 403, description = "Caller is not the recipient", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "No such message", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Messages"
)]
pub async fn mark_seen(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    Ok(Json(state.messaging().mark_seen(&identity, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Caller is not the sender", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "No such message", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Messages"
)]
pub async fn delete_message(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.messaging().delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
