use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use tracing::warn;

use crate::{app_state::SharedAppState, db::bootstrap};

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
    open_streams: usize,
}

fn record(endpoint: &'static str, status: &'static str) {
    metrics::counter!("health_checks_total", "endpoint" => endpoint, "status" => status)
        .increment(1);
}

async fn healthz(State(state): State<SharedAppState>) -> impl IntoResponse {
    record("healthz", "ok");
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            open_streams: state.registry().len().await,
        }),
    )
}

/// Ready once the backing store can serve requests. The in-memory backend is
/// always ready.
async fn readyz(State(state): State<SharedAppState>) -> impl IntoResponse {
    let open_streams = state.registry().len().await;
    let Some(pool) = state.pool.as_ref() else {
        record("readyz", "ok");
        return (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                open_streams,
            }),
        );
    };

    match bootstrap::ensure_readiness(pool).await {
        Ok(()) => {
            record("readyz", "ok");
            (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "ready",
                    open_streams,
                }),
            )
        }
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            record("readyz", "error");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    open_streams,
                }),
            )
        }
    }
}

pub fn create_health_router() -> Router<SharedAppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
