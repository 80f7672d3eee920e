use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::Response,
};
use shared::{config::server::Config, models::Identity};
use tracing::{Span, debug};

use crate::{
    http::error::{ApiError, AppResult},
    middleware::request_context::{RequestContext, extract_header},
};

/// Which header the upstream auth gateway stamps the verified identity into.
#[derive(Clone, Debug)]
pub struct IdentityState {
    header: HeaderName,
}

impl IdentityState {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.auth.identity_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-beacon-identity"));
        Self { header }
    }
}

/// Trusts the gateway header unconditionally; rejects requests without one.
pub async fn require_identity(
    State(state): State<IdentityState>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let identity = extract_header(req.headers(), &state.header)
        .map(Identity::from)
        .ok_or_else(|| {
            ApiError::unauthorized(format!("missing '{}' header", state.header.as_str()))
        })?;

    Span::current().record("identity", identity.as_str());
    debug!(identity = %identity, path = %req.uri().path(), "request identity resolved");

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.identity = Some(identity);
    } else {
        req.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            identity: Some(identity),
        });
    }

    Ok(next.run(req).await)
}
