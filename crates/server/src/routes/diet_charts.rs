//! Diet chart route handlers.
//!
//! Creating a chart also creates its delivery in one operation; the two
//! are returned together so the dashboard can show the new pending row
//! immediately.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::Result;
use crate::middleware::{RequireManager, RequireUser};
use crate::models::{DeliveryView, DietChart, DietChartView, NewDietChart};
use crate::state::AppState;

/// Response for chart creation: the chart and its paired delivery.
#[derive(Debug, Serialize)]
pub struct CreateChartResponse {
    pub diet_chart: DietChart,
    pub delivery: DeliveryView,
}

/// List all diet charts with patient and assignee resolved.
///
/// # Errors
///
/// Returns an error if the store query fails.
pub async fn index(
    RequireUser(_user): RequireUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DietChartView>>> {
    let charts = state.store().list_diet_charts().await?;
    Ok(Json(charts))
}

/// Create a diet chart and its delivery (manager only).
///
/// Emits a `new_preparation_task` event to the pantry assignee.
///
/// # Errors
///
/// Returns 400 if the patient or pantry assignee does not resolve, or
/// the assignee is not pantry staff.
pub async fn create(
    RequireManager(manager): RequireManager,
    State(state): State<AppState>,
    Json(body): Json<NewDietChart>,
) -> Result<Json<CreateChartResponse>> {
    let (diet_chart, delivery) = state.workflow().create_diet_chart(body, &manager).await?;
    tracing::info!(
        chart_id = %diet_chart.id,
        delivery_id = %delivery.id,
        pantry = %delivery.assigned_to_pantry.id,
        "diet chart created"
    );
    Ok(Json(CreateChartResponse {
        diet_chart,
        delivery,
    }))
}
