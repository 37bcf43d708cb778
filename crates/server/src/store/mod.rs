//! Delivery record store.
//!
//! The workflow engine treats storage as a seam: any durable keyed store
//! with read-after-write consistency satisfies the [`Store`] trait. Two
//! adapters are provided:
//!
//! - [`postgres::PgStore`] - production adapter over sqlx/`PostgreSQL`.
//!   Migrations are stored in `crates/server/migrations/` and run on
//!   startup.
//! - [`memory::MemoryStore`] - in-process adapter used by tests and
//!   available for local runs without a database.
//!
//! Delivery updates are version-checked: every write carries the version
//! the caller read, and a mismatch fails with [`StoreError::Conflict`]
//! instead of silently overwriting a concurrent actor's change.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;

use mealtrack_core::{DeliveryId, DietChartId, Email, PatientId, Role, UserId};

use crate::models::{
    Delivery, DeliveryPatch, DeliveryView, DietChart, DietChartView, NewDietChart, NewPatient,
    NewUser, Patient, User,
};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Version check failed: another writer updated the row first.
    #[error("version conflict")]
    Conflict,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Storage seam for the meal workflow service.
///
/// Read-after-write consistency is assumed: a successful update is visible
/// to the next read on any connection.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Users
    // =========================================================================

    /// Create a staff member. Fails with `ConstraintViolation` if the email
    /// is already registered.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    /// Get a user by ID.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up a user and their password hash by login email.
    async fn find_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, StoreError>;

    /// List users holding a given role, ordered by name.
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    /// Total number of registered users.
    async fn count_users(&self) -> Result<i64, StoreError>;

    // =========================================================================
    // Patients
    // =========================================================================

    /// Create a patient record.
    async fn create_patient(&self, new: NewPatient) -> Result<Patient, StoreError>;

    /// Replace a patient record. Fails with `NotFound` if the id does not
    /// resolve.
    async fn update_patient(&self, id: PatientId, new: NewPatient) -> Result<Patient, StoreError>;

    /// Get a patient by ID.
    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError>;

    /// List all patients, newest first.
    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    // =========================================================================
    // Diet charts and deliveries
    // =========================================================================

    /// Create a diet chart together with its delivery as one operation.
    ///
    /// The delivery starts at pending/pending with the chart's pantry
    /// assignee and no delivery assignee.
    async fn create_diet_chart_with_delivery(
        &self,
        new: NewDietChart,
    ) -> Result<(DietChart, Delivery), StoreError>;

    /// Get a diet chart by ID.
    async fn get_diet_chart(&self, id: DietChartId) -> Result<Option<DietChart>, StoreError>;

    /// List all diet charts with patient and assignee resolved, newest first.
    async fn list_diet_charts(&self) -> Result<Vec<DietChartView>, StoreError>;

    /// Get a delivery by ID.
    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError>;

    /// Get a delivery with every reference resolved for display.
    async fn get_delivery_view(&self, id: DeliveryId) -> Result<Option<DeliveryView>, StoreError>;

    /// Role-scoped delivery listing, newest first.
    ///
    /// Pantry staff see deliveries where they are the pantry assignee,
    /// delivery staff those where they are the delivery assignee, and
    /// managers see all.
    async fn list_deliveries_for(
        &self,
        role: Role,
        user_id: UserId,
    ) -> Result<Vec<DeliveryView>, StoreError>;

    /// Apply a version-checked partial update to a delivery.
    ///
    /// Bumps the version and `updated_at` on success. Fails with `NotFound`
    /// if the id does not resolve and `Conflict` if the stored version no
    /// longer matches `patch.expected_version`.
    async fn update_delivery(
        &self,
        id: DeliveryId,
        patch: DeliveryPatch,
    ) -> Result<Delivery, StoreError>;

    /// Verify the store is reachable (readiness probe).
    async fn ping(&self) -> Result<(), StoreError>;
}
