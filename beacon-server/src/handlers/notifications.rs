use axum::{Json, extract::State, http::StatusCode};
use shared::models::{InteractionRequest, Notification};

use crate::{
    app_state::SharedAppState, http::error::AppResult,
    middleware::request_context::CurrentIdentity,
};

/// Records a like, comment, follow, or connection request and notifies the
/// target.
#[utoipa::path(
    post,
    path = "/api/interactions",
    request_body = InteractionRequest,
    responses(
        (status = 201, description = "Notification stored", body = Notification),
        (status = 400, description = "Self-targeted or incomplete interaction", body = crate::http::problem::ProblemDetails),
        (status = 404, description = "Unknown recipient", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Notifications"
)]
pub async fn create_interaction(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<InteractionRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    let notification = state.messaging().interact(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Newest first. Listing marks them read; the response shows the flags from
/// before the call.
#[utoipa::path(
    get,
    path = "/api/notifications",
    responses((status = 200, description = "Caller's notifications", body = [Notification])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(state.messaging().notifications(&identity).await?))
}
