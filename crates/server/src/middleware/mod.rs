//! Middleware for the meal workflow API.

pub mod auth;
pub mod session;

pub use auth::{RequireManager, RequireUser};
pub use session::{create_memory_session_layer, create_session_layer};
