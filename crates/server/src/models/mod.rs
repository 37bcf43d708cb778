//! Domain models for the meal workflow service.
//!
//! These types represent validated domain objects separate from database
//! row types. The `*View` types are denormalized for display: the dashboard
//! renders delivery rows without issuing follow-up lookups, so lists carry
//! the nested patient and assignee fields inline.

pub mod session;

pub use session::{CurrentUser, session_keys};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use mealtrack_core::{
    DeliveryId, DeliveryStatus, DietChartId, Email, Gender, MealType, PatientId,
    PreparationStatus, Role, UserId,
};

/// A staff member (domain type).
///
/// The password hash is deliberately not part of this type; it is only
/// surfaced by the credential lookup used during login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name shown in assignment pickers and delivery rows.
    pub full_name: String,
    /// Login identifier.
    pub email: Email,
    /// Staff role, used for authorization and notification routing.
    pub role: Role,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a staff member.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: Email,
    pub role: Role,
    /// Argon2id password hash in PHC string format.
    pub password_hash: String,
}

/// An admitted patient with ward placement and medical flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: i32,
    pub gender: Gender,
    pub room_number: String,
    pub bed_number: String,
    pub floor_number: String,
    pub diseases: Vec<String>,
    pub allergies: Vec<String>,
    pub contact_number: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a patient record.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: i32,
    #[serde(default)]
    pub gender: Gender,
    pub room_number: String,
    pub bed_number: String,
    pub floor_number: String,
    #[serde(default)]
    pub diseases: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub emergency_contact_number: Option<String>,
}

/// A prescribed meal plan for a patient on a given date and meal slot.
///
/// Immutable once created; the paired [`Delivery`] carries all workflow
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietChart {
    pub id: DietChartId,
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub ingredients: Vec<String>,
    pub instructions: String,
    /// Pantry staff member responsible for preparing this meal.
    pub assigned_pantry: UserId,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a diet chart together with its delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDietChart {
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub meal_type: MealType,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub instructions: String,
    pub assigned_pantry: UserId,
}

/// The central workflow entity: one meal moving from pantry to ward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub diet_chart_id: DietChartId,
    pub preparation_status: PreparationStatus,
    pub delivery_status: DeliveryStatus,
    /// Required pantry assignee, set at creation.
    pub assigned_to_pantry: UserId,
    /// Delivery assignee; only settable once preparation is ready.
    pub assigned_to_delivery: Option<UserId>,
    /// Stamped when `delivery_status` becomes delivered.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Monotonic counter bumped on every update, checked on writes.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a delivery that the workflow engine may change in one write.
///
/// The write succeeds only if the stored version still equals
/// `expected_version`; a mismatch means another actor updated the row in
/// the meantime.
#[derive(Debug, Clone, Default)]
pub struct DeliveryPatch {
    pub expected_version: i32,
    pub preparation_status: Option<PreparationStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub assigned_to_delivery: Option<UserId>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Denormalized views
// =============================================================================

/// Minimal user fields embedded in list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
        }
    }
}

/// Minimal patient fields embedded in list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: PatientId,
    pub name: String,
    pub room_number: String,
    pub bed_number: String,
    pub floor_number: String,
}

impl From<&Patient> for PatientSummary {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            name: patient.name.clone(),
            room_number: patient.room_number.clone(),
            bed_number: patient.bed_number.clone(),
            floor_number: patient.floor_number.clone(),
        }
    }
}

/// A diet chart with its patient and pantry assignee resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietChartView {
    pub id: DietChartId,
    pub patient: PatientSummary,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub ingredients: Vec<String>,
    pub instructions: String,
    pub assigned_pantry: UserSummary,
    pub created_at: DateTime<Utc>,
}

/// The chart fields a delivery row needs to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryChartSummary {
    pub id: DietChartId,
    pub patient: PatientSummary,
    pub date: NaiveDate,
    pub meal_type: MealType,
}

/// A delivery with every reference resolved for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryView {
    pub id: DeliveryId,
    pub diet_chart: DeliveryChartSummary,
    pub preparation_status: PreparationStatus,
    pub delivery_status: DeliveryStatus,
    pub assigned_to_pantry: UserSummary,
    pub assigned_to_delivery: Option<UserSummary>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}
