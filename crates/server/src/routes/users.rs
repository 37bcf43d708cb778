//! Staff listing route handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use mealtrack_core::Role;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::UserSummary;
use crate::state::AppState;

/// Query parameters for the staff picker listing.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: String,
}

/// List users holding a role, for the assignment pickers.
///
/// # Errors
///
/// Returns 400 for an unknown role value.
pub async fn index(
    RequireUser(_user): RequireUser,
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserSummary>>> {
    let role: Role = query.role.parse().map_err(AppError::Validation)?;

    let users = state.store().list_users_by_role(role).await?;
    let summaries = users.iter().map(UserSummary::from).collect();
    Ok(Json(summaries))
}
