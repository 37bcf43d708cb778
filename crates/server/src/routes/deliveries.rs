//! Delivery route handlers.
//!
//! The status fields come as text and are parsed explicitly, so an
//! unknown enum value fails with 400 and the JSON error shape rather
//! than a deserialization rejection. The acting user always comes from
//! the session, never from the request.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use mealtrack_core::{DeliveryId, DeliveryStatus, PreparationStatus, UserId};

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::DeliveryView;
use crate::state::AppState;

/// Role-scoped delivery listing for the session user.
///
/// Pantry staff see deliveries where they are the pantry assignee,
/// delivery staff those where they are the delivery assignee, and
/// managers see all.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub async fn index(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DeliveryView>>> {
    let deliveries = state.store().list_deliveries_for(user.role, user.id).await?;
    Ok(Json(deliveries))
}

/// Request body for a preparation status move.
#[derive(Debug, Deserialize)]
pub struct UpdatePreparationRequest {
    pub preparation_status: String,
}

/// Move a delivery's preparation status (assigned pantry staff only).
///
/// # Errors
///
/// Returns 400 for an unknown status value, 403 for a role or assignee
/// mismatch, 404 for an unknown delivery, and 409 for a non-forward move
/// or a lost version race.
pub async fn update_preparation_status(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<DeliveryId>,
    Json(body): Json<UpdatePreparationRequest>,
) -> Result<Json<DeliveryView>> {
    let status: PreparationStatus = body
        .preparation_status
        .parse()
        .map_err(AppError::Validation)?;

    let view = state
        .workflow()
        .transition_preparation(id, status, &user)
        .await?;
    Ok(Json(view))
}

/// Request body for a delivery status move.
#[derive(Debug, Deserialize)]
pub struct UpdateDeliveryRequest {
    pub delivery_status: String,
}

/// Move a delivery's delivery status (assigned delivery staff only).
///
/// # Errors
///
/// As for [`update_preparation_status`].
pub async fn update_delivery_status(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<DeliveryId>,
    Json(body): Json<UpdateDeliveryRequest>,
) -> Result<Json<DeliveryView>> {
    let status: DeliveryStatus = body
        .delivery_status
        .parse()
        .map_err(AppError::Validation)?;

    let view = state
        .workflow()
        .transition_delivery(id, status, &user)
        .await?;
    Ok(Json(view))
}

/// Request body for assigning delivery staff.
#[derive(Debug, Deserialize)]
pub struct AssignDeliveryRequest {
    pub assigned_to_delivery: UserId,
}

/// Assign a delivery staff member to a ready delivery.
///
/// # Errors
///
/// Returns 409 if preparation is not ready or staff is already assigned,
/// and 400 if the staff id does not resolve to a delivery-role user.
pub async fn assign_delivery(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
    Path(id): Path<DeliveryId>,
    Json(body): Json<AssignDeliveryRequest>,
) -> Result<Json<DeliveryView>> {
    let view = state
        .workflow()
        .assign_delivery_staff(id, body.assigned_to_delivery, &user)
        .await?;
    Ok(Json(view))
}
