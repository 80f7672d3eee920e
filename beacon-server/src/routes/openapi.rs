use crate::{app_state::SharedAppState, openapi::ApiDoc};
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

async fn openapi_yaml() -> impl IntoResponse {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => (StatusCode::OK, yaml),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("YAML error: {e}"),
        ),
    }
}

pub fn openapi_routes() -> Router<SharedAppState> {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi/beacon.json", ApiDoc::openapi()))
        .route("/openapi/beacon.yaml", get(openapi_yaml))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use axum::{body::Body, http::Request};
    use shared::config::server::{Config, Profile};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn yaml_document_lists_stream_path() {
        let state = Arc::new(AppState::in_memory(Arc::new(Config::default_for_profile(
            Profile::Test,
        ))));
        let response = openapi_routes()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri("/openapi/beacon.yaml")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("/api/stream"));
        assert!(body.contains("/api/messages"));
    }
}
