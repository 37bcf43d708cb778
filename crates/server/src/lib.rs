//! Mealtrack server library.
//!
//! This crate provides the meal workflow service as a library, allowing
//! it to be tested in-process and reused by the binary.
//!
//! # Architecture
//!
//! - Axum JSON API consumed by the role-based dashboard
//! - Status workflow engine over a storage seam ([`store::Store`])
//! - Per-user notification rooms fanned out over Server-Sent Events
//! - `PostgreSQL` persistence and tower-sessions authentication

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;
pub mod store;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use state::AppState;

/// Build the application router over a state and session layer.
///
/// The session layer is a parameter so the binary can use the
/// `PostgreSQL` store while tests use the in-memory one.
pub fn build_router<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let cors = cors_layer(state.config().allowed_origin.as_str());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the dashboard origin.
///
/// Credentials (the session cookie) require a concrete origin; a
/// wildcard is rejected by browsers.
fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = allowed_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000"));

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
