//! Demo account seeding.
//!
//! User provisioning has no public endpoint; production accounts are
//! created operationally. For local development the server can seed one
//! account per role on startup (gated by `MEALTRACK_SEED_DEMO_USERS`)
//! so the dashboard is usable against a fresh database.

use mealtrack_core::Role;

use crate::services::auth::{AuthError, AuthService};
use crate::store::Store;

/// Local development only; never enable seeding against real data.
const DEMO_PASSWORD: &str = "Password@2025";

const DEMO_USERS: &[(&str, &str, Role)] = &[
    ("Hospital Manager", "manager@mealtrack.test", Role::Manager),
    ("Pantry Staff", "pantry@mealtrack.test", Role::PantryStaff),
    ("Delivery Staff", "delivery@mealtrack.test", Role::Delivery),
];

/// Create the demo accounts if the users table is empty.
///
/// # Errors
///
/// Returns an error if a lookup or registration fails.
pub async fn seed_demo_users(store: &dyn Store) -> Result<(), AuthError> {
    if store.count_users().await? > 0 {
        tracing::debug!("users exist, skipping demo seed");
        return Ok(());
    }

    let auth = AuthService::new(store);
    for (name, email, role) in DEMO_USERS {
        let user = auth.register(name, email, DEMO_PASSWORD, *role).await?;
        tracing::info!(user_id = %user.id, role = %role, email, "seeded demo user");
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_creates_one_account_per_role() {
        let store = MemoryStore::new();
        seed_demo_users(&store).await.unwrap();

        for role in [Role::Manager, Role::PantryStaff, Role::Delivery] {
            assert_eq!(store.list_users_by_role(role).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        seed_demo_users(&store).await.unwrap();
        seed_demo_users(&store).await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 3);
    }
}
