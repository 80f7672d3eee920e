//! Beacon server: per-identity push streams over server-sent events, backed
//! by a message store that stays the source of truth.

pub mod app_state;
pub mod db;
mod handlers;
pub mod http;
mod middleware;
pub mod openapi;
mod routes;
pub mod server;
pub mod services;
mod tracer;
