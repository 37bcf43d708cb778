//! Authentication route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use mealtrack_core::Role;

use crate::error::{AppError, Result};
use crate::middleware::auth::{clear_current_user, set_current_user};
use crate::middleware::RequireUser;
use crate::models::CurrentUser;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Login request body.
///
/// The role comes as text so an unknown value fails with the JSON error
/// shape the dashboard reads, not a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Login with email, password, and asserted role.
///
/// The asserted role must match the stored role; the session identity is
/// the only role source for every later request.
///
/// # Errors
///
/// Returns 400 for an unknown role value and 401 for bad credentials or
/// a role mismatch.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<CurrentUser>> {
    let role: Role = body
        .role
        .parse()
        .map_err(AppError::Validation)?;

    let auth = AuthService::new(state.store());
    let user = auth.login(&body.email, &body.password, role).await?;

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current)
        .await
        .map_err(|e| AppError::Internal(format!("failed to write session: {e}")))?;

    tracing::info!(user_id = %current.id, role = %current.role, "login");

    Ok(Json(current))
}

/// Logout the current session.
pub async fn logout(session: Session) -> Result<Json<serde_json::Value>> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("failed to clear session: {e}")))?;

    Ok(Json(json!({ "success": true })))
}

/// Return the current session identity.
pub async fn me(RequireUser(user): RequireUser) -> Json<CurrentUser> {
    Json(user)
}
