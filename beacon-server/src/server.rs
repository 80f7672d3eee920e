use axum::{Extension, Router, response::IntoResponse, routing::get, serve};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, DatabaseConfig, LogFormat, StoreBackend};
use sqlx::postgres::PgPoolOptions;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::{AppState, SharedAppState},
    db::bootstrap::{self, BootstrapError},
    middleware::{
        auth::IdentityState,
        request_context::{self, RequestIdState},
    },
    routes::{self, openapi::openapi_routes},
    tracer,
};
use axum::http::{HeaderValue, StatusCode, header};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder on first use and returns its handle.
/// When another recorder is already installed the handle still renders, but
/// stays empty.
pub(crate) fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(err) = metrics::set_global_recorder(recorder) {
                warn!(error = %err, "metrics recorder already installed");
            }
            handle
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Startup failures of [`run`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("failed to bind or serve: {0}")]
    Io(#[from] std::io::Error),
}

/// Initializes the global tracing subscriber. Returns the configured level.
pub fn initialize_tracing(config: &Config) -> String {
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        builder.json().with_ansi(false).try_init()
    } else {
        builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Opens the Postgres pool.
///
/// # Errors
/// Returns an error if no connection can be established.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Builds state for the configured store backend, bootstrapping the schema
/// when Postgres is used.
///
/// # Errors
/// Returns [`ServerError`] when the database is unreachable or the bootstrap
/// scripts fail.
pub async fn create_app_state(config: Arc<Config>) -> Result<SharedAppState, ServerError> {
    let state = match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory stores");
            AppState::in_memory(config)
        }
        StoreBackend::Postgres => {
            let pool = create_database_pool(&config.db).await?;
            bootstrap::ensure_liveness(&pool).await?;
            bootstrap::run(&pool, &config.db).await?;
            bootstrap::ensure_readiness(&pool).await?;
            info!(max_connections = config.db.max_connections, "using postgres stores");
            AppState::postgres(config, pool)
        }
    };
    Ok(Arc::new(state))
}

pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .allow_credentials(config.server.cors.allow_credentials)
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors.allow_origin(AllowOrigin::any())
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Routes under `/api`, all behind the identity header.
pub fn create_api_router(config: &Config) -> Router<SharedAppState> {
    routes::api::create_router_api(IdentityState::from_config(config))
}

/// Full application router with middleware, probes, metrics, and docs.
pub fn create_app_router(state: SharedAppState, metrics_handle: PrometheusHandle) -> Router {
    let config = Arc::clone(&state.config);
    let cors = create_cors_layer(&config);
    let request_id_state = RequestIdState::from_config(&config);

    Router::new()
        .nest("/api", create_api_router(&config))
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .merge(openapi_routes())
        .layer(Extension(metrics_handle))
        .layer(cors)
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

/// Resolves on Ctrl+C, or never if the handler cannot be installed.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

/// Serves `state` on `listener` until `shutdown` resolves. The idle sweeper
/// runs for the lifetime of the server.
///
/// # Errors
/// Returns an error if the listener fails.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: SharedAppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let sweeper_token = CancellationToken::new();
    let sweeper = state.supervisor().spawn_sweeper(sweeper_token.clone());
    let registry = Arc::clone(state.registry());
    let app = create_app_router(state, metrics_handle());

    // Open streams never finish on their own; close them so the graceful
    // shutdown can drain.
    let stop_token = sweeper_token.clone();
    let shutdown = async move {
        shutdown.await;
        stop_token.cancel();
        for handle in registry.handles().await {
            handle.close();
        }
    };

    let result = serve(listener, app).with_graceful_shutdown(shutdown).await;

    sweeper_token.cancel();
    if let Err(err) = sweeper.await {
        warn!(error = %err, "idle sweeper task failed");
    }
    result.map_err(ServerError::from)
}

/// Starts the server on the configured host and port.
///
/// # Errors
/// Returns an error if the store cannot be prepared or the port cannot be
/// bound.
pub async fn run(config: Config) -> Result<(), ServerError> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, "starting beacon server");

    let config = Arc::new(config);
    let state = create_app_state(Arc::clone(&config)).await?;

    let host = config
        .server
        .host
        .parse()
        .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
    let addr = SocketAddr::new(host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    serve_with_shutdown(listener, state, create_shutdown_signal()).await
}
