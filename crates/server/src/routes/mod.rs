//! HTTP route handlers for the meal workflow API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                   - Liveness check
//! GET  /health/ready                             - Readiness check (store ping)
//!
//! # Auth
//! POST /api/auth/login                           - Login (email, password, role)
//! POST /api/auth/logout                          - Logout
//! GET  /api/auth/me                              - Current session identity
//!
//! # Patients (manager mutations)
//! GET  /api/patients                             - List patients
//! POST /api/patients                             - Create patient
//! PUT  /api/patients/{id}                        - Replace patient
//!
//! # Diet charts
//! GET  /api/diet-charts                          - List charts (denormalized)
//! POST /api/diet-charts                          - Create chart + delivery (manager)
//!
//! # Deliveries
//! GET  /api/deliveries                           - Role-scoped list for session user
//! PATCH /api/deliveries/{id}/preparation_status  - Move preparation status
//! PATCH /api/deliveries/{id}/delivery_status     - Move delivery status
//! PATCH /api/deliveries/{id}/assign_delivery     - Assign delivery staff
//!
//! # Staff pickers
//! GET  /api/users?role=                          - List users holding a role
//!
//! # Real-time
//! GET  /api/events                               - SSE stream for the session user
//! ```

pub mod auth;
pub mod deliveries;
pub mod diet_charts;
pub mod events;
pub mod patients;
pub mod users;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the patient routes router.
pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(patients::index).post(patients::create))
        .route("/{id}", axum::routing::put(patients::update))
}

/// Create the diet chart routes router.
pub fn diet_chart_routes() -> Router<AppState> {
    Router::new().route("/", get(diet_charts::index).post(diet_charts::create))
}

/// Create the delivery routes router.
pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(deliveries::index))
        .route(
            "/{id}/preparation_status",
            patch(deliveries::update_preparation_status),
        )
        .route(
            "/{id}/delivery_status",
            patch(deliveries::update_delivery_status),
        )
        .route("/{id}/assign_delivery", patch(deliveries::assign_delivery))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/patients", patient_routes())
        .nest("/api/diet-charts", diet_chart_routes())
        .nest("/api/deliveries", delivery_routes())
        .route("/api/users", get(users::index))
        .route("/api/events", get(events::stream))
}
