//! Session-related types.
//!
//! Types stored in the session for authentication state. Every mutation is
//! authorized against this server-held identity; the client never supplies
//! its own role or user id.

use serde::{Deserialize, Serialize};

use mealtrack_core::{Email, Role, UserId};

use super::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in staff
/// member and authorize their actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Login email.
    pub email: Email,
    /// Staff role.
    pub role: Role,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
