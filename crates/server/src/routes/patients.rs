//! Patient route handlers.
//!
//! Patients are created and mutated only by managers and never deleted.

use axum::{
    Json,
    extract::{Path, State},
};

use mealtrack_core::PatientId;

use crate::error::{AppError, Result};
use crate::middleware::{RequireManager, RequireUser};
use crate::models::{NewPatient, Patient};
use crate::state::AppState;

/// List all patients, newest first.
///
/// Any authenticated staff member may read; pantry staff see patient
/// flags (allergies) on their preparation tasks.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub async fn index(
    RequireUser(_user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Patient>>> {
    let patients = state.store().list_patients().await?;
    Ok(Json(patients))
}

/// Create a patient record (manager only).
///
/// # Errors
///
/// Returns an error if the store write fails.
pub async fn create(
    RequireManager(_manager): RequireManager,
    State(state): State<AppState>,
    Json(body): Json<NewPatient>,
) -> Result<Json<Patient>> {
    let patient = state.store().create_patient(body).await?;
    tracing::info!(patient_id = %patient.id, "patient created");
    Ok(Json(patient))
}

/// Replace a patient record (manager only).
///
/// # Errors
///
/// Returns 404 for an unknown patient id.
pub async fn update(
    RequireManager(_manager): RequireManager,
    State(state): State<AppState>,
    Path(id): Path<PatientId>,
    Json(body): Json<NewPatient>,
) -> Result<Json<Patient>> {
    let patient = state
        .store()
        .update_patient(id, body)
        .await
        .map_err(|e| match e {
            crate::store::StoreError::NotFound => {
                AppError::NotFound(format!("patient {id} not found"))
            }
            other => AppError::Store(other),
        })?;
    Ok(Json(patient))
}
