use axum::{
    Json,
    extract::{Path, State},
};
use shared::models::{Identity, PublicProfile, UpsertProfileRequest};

use crate::{
    app_state::SharedAppState, http::error::AppResult,
    middleware::request_context::CurrentIdentity,
};

/// Profile sync hook for the auth provider.
#[utoipa::path(
    put,
    path = "/api/profiles/me",
    request_body = UpsertProfileRequest,
    responses(
        (status = 200, description = "Stored profile", body = PublicProfile),
        (status = 400, description = "Blank display name", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Profiles"
)]
pub async fn upsert_my_profile(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<UpsertProfileRequest>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(
        state.messaging().upsert_profile(&identity, request).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/profiles/me",
    responses(
        (status = 200, description = "Caller's profile", body = PublicProfile),
        (status = 404, description = "No profile stored yet", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Profiles"
)]
pub async fn my_profile(
    State(state): State<SharedAppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(state.messaging().profile(&identity).await?))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{identity}",
    params(("identity" = String, Path, description = "Profile owner")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfile),
        (status = 404, description = "Unknown identity", body = crate::http::problem::ProblemDetails)
    ),
    tag = "Profiles"
)]
pub async fn get_profile(
    State(state): State<SharedAppState>,
    Path(identity): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(
        state.messaging().profile(&Identity::from(identity)).await?,
    ))
}
