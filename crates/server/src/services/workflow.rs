//! Status workflow engine.
//!
//! Validates and applies preparation/delivery state transitions, enforces
//! which role may move which field, and fans change events out to the
//! users a delivery affects.
//!
//! # Transition policy
//!
//! Both machines move strictly forward one step at a time:
//!
//! ```text
//! preparation_status: pending -> preparing -> ready
//! delivery_status:    pending -> in_progress -> delivered
//! ```
//!
//! Any other move is rejected unless the `allow_status_rollback` flag
//! is set, which permits repositioning to any other status of the same
//! machine. `delivered` is terminal either way, since un-delivering a
//! stamped meal would falsify `delivered_at`. Re-applying the current
//! status is an idempotent no-op: nothing is written and no event is
//! emitted.
//!
//! # Ordering
//!
//! Writes persist before events are emitted. A crash between the two loses
//! the notification; clients recover by re-fetching their list, so the
//! bus is never treated as a source of truth.

use chrono::Utc;
use thiserror::Error;

use mealtrack_core::{DeliveryId, DeliveryStatus, PreparationStatus, Role, UserId};

use crate::models::{CurrentUser, Delivery, DeliveryPatch, DeliveryView, DietChart, NewDietChart};
use crate::notify::{Notifier, WorkflowEvent};
use crate::store::{Store, StoreError};

/// Errors from workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or unresolvable input (e.g., assignee with the wrong role).
    #[error("{0}")]
    Validation(String),

    /// The actor's role or identity does not permit this action.
    #[error("{0}")]
    Forbidden(String),

    /// The delivery, chart, or patient id does not resolve.
    #[error("not found")]
    NotFound,

    /// The delivery is not in a state that permits this action.
    #[error("{0}")]
    PreconditionFailed(String),

    /// A concurrent update won the version race; re-fetch and retry.
    #[error("delivery was updated concurrently")]
    Conflict,

    /// Store failure unrelated to workflow rules.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Conflict => Self::Conflict,
            other => Self::Store(other),
        }
    }
}

/// The status workflow engine.
///
/// Constructed per request from the application state; holds no state of
/// its own beyond the rollback policy flag.
pub struct WorkflowService<'a> {
    store: &'a dyn Store,
    notifier: &'a Notifier,
    allow_rollback: bool,
}

impl<'a> WorkflowService<'a> {
    /// Create a workflow engine over the given store and notification bus.
    #[must_use]
    pub const fn new(store: &'a dyn Store, notifier: &'a Notifier, allow_rollback: bool) -> Self {
        Self {
            store,
            notifier,
            allow_rollback,
        }
    }

    /// Create a diet chart together with its delivery as one operation.
    ///
    /// Manager only. The new delivery starts at pending/pending with the
    /// chart's pantry assignee, and a `new_preparation_task` event is sent
    /// to that assignee.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the actor is not a manager, `Validation` if
    /// the patient or pantry assignee does not resolve or the assignee is
    /// not pantry staff.
    pub async fn create_diet_chart(
        &self,
        input: NewDietChart,
        actor: &CurrentUser,
    ) -> Result<(DietChart, DeliveryView), WorkflowError> {
        if actor.role != Role::Manager {
            return Err(WorkflowError::Forbidden(
                "only managers can create diet charts".to_string(),
            ));
        }

        self.store
            .get_patient(input.patient_id)
            .await?
            .ok_or_else(|| {
                WorkflowError::Validation(format!("unknown patient: {}", input.patient_id))
            })?;

        let assignee = self
            .store
            .get_user(input.assigned_pantry)
            .await?
            .ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "unknown pantry staff: {}",
                    input.assigned_pantry
                ))
            })?;
        if assignee.role != Role::PantryStaff {
            return Err(WorkflowError::Validation(format!(
                "user {} is not pantry staff",
                assignee.id
            )));
        }

        let (chart, delivery) = self.store.create_diet_chart_with_delivery(input).await?;
        let view = self.view_of(delivery.id).await?;

        self.notifier.publish(
            delivery.assigned_to_pantry,
            &WorkflowEvent::NewPreparationTask {
                delivery: Box::new(view.clone()),
            },
        );

        Ok((chart, view))
    }

    /// Move a delivery's preparation status.
    ///
    /// The actor must be pantry staff and the delivery's pantry assignee.
    /// On success a `preparation_status_updated` event goes to the pantry
    /// assignee, the delivery assignee if set, and all managers.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` on role or assignee mismatch, `NotFound` for an
    /// unknown delivery, `PreconditionFailed` for a non-forward move, and
    /// `Conflict` if a concurrent update won the version race.
    pub async fn transition_preparation(
        &self,
        delivery_id: DeliveryId,
        new_status: PreparationStatus,
        actor: &CurrentUser,
    ) -> Result<DeliveryView, WorkflowError> {
        if actor.role != Role::PantryStaff {
            return Err(WorkflowError::Forbidden(
                "only pantry staff can update preparation status".to_string(),
            ));
        }

        let delivery = self.load(delivery_id).await?;
        if delivery.assigned_to_pantry != actor.id {
            return Err(WorkflowError::Forbidden(
                "only the assigned pantry staff can update this delivery".to_string(),
            ));
        }

        // Idempotent re-apply: no write, no event.
        if delivery.preparation_status == new_status {
            return self.view_of(delivery_id).await;
        }

        check_move(
            delivery.preparation_status.can_advance_to(new_status),
            self.allow_rollback,
            &delivery.preparation_status,
            &new_status,
        )?;

        let updated = self
            .store
            .update_delivery(
                delivery_id,
                DeliveryPatch {
                    expected_version: delivery.version,
                    preparation_status: Some(new_status),
                    ..Default::default()
                },
            )
            .await?;

        let audience = self.status_audience(&updated).await?;
        self.notifier.publish_to_all(
            &audience,
            &WorkflowEvent::PreparationStatusUpdated {
                delivery_id,
                status: new_status,
            },
        );

        self.view_of(delivery_id).await
    }

    /// Assign a delivery staff member to a ready delivery.
    ///
    /// Managers and pantry staff may assign. On success the staff member
    /// receives a `new_delivery_task` event carrying the full record.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if preparation is not ready or a staff
    /// member is already assigned, `Validation` if `staff_id` does not
    /// resolve to a user with the delivery role.
    pub async fn assign_delivery_staff(
        &self,
        delivery_id: DeliveryId,
        staff_id: UserId,
        actor: &CurrentUser,
    ) -> Result<DeliveryView, WorkflowError> {
        if actor.role == Role::Delivery {
            return Err(WorkflowError::Forbidden(
                "delivery staff cannot assign deliveries".to_string(),
            ));
        }

        let delivery = self.load(delivery_id).await?;
        if delivery.preparation_status != PreparationStatus::Ready {
            return Err(WorkflowError::PreconditionFailed(
                "preparation must be ready before assigning delivery staff".to_string(),
            ));
        }
        if delivery.assigned_to_delivery.is_some() {
            return Err(WorkflowError::PreconditionFailed(
                "delivery staff already assigned".to_string(),
            ));
        }

        let staff = self
            .store
            .get_user(staff_id)
            .await?
            .ok_or_else(|| WorkflowError::Validation(format!("unknown user: {staff_id}")))?;
        if staff.role != Role::Delivery {
            return Err(WorkflowError::Validation(format!(
                "user {staff_id} is not delivery staff"
            )));
        }

        self.store
            .update_delivery(
                delivery_id,
                DeliveryPatch {
                    expected_version: delivery.version,
                    assigned_to_delivery: Some(staff_id),
                    ..Default::default()
                },
            )
            .await?;

        let view = self.view_of(delivery_id).await?;
        self.notifier.publish(
            staff_id,
            &WorkflowEvent::NewDeliveryTask {
                delivery: Box::new(view.clone()),
            },
        );

        Ok(view)
    }

    /// Move a delivery's delivery status.
    ///
    /// The actor must be delivery staff and the delivery's assignee.
    /// Reaching `delivered` stamps `delivered_at`; `delivered` is terminal
    /// regardless of the rollback flag. On success a
    /// `delivery_status_updated` event goes to the pantry assignee, the
    /// delivery assignee, and all managers.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` on role or assignee mismatch (an unassigned
    /// delivery has no permitted actor, so it cannot advance past
    /// pending), `NotFound`, `PreconditionFailed`, and `Conflict` as for
    /// [`Self::transition_preparation`].
    pub async fn transition_delivery(
        &self,
        delivery_id: DeliveryId,
        new_status: DeliveryStatus,
        actor: &CurrentUser,
    ) -> Result<DeliveryView, WorkflowError> {
        if actor.role != Role::Delivery {
            return Err(WorkflowError::Forbidden(
                "only delivery staff can update delivery status".to_string(),
            ));
        }

        let delivery = self.load(delivery_id).await?;
        if delivery.assigned_to_delivery != Some(actor.id) {
            return Err(WorkflowError::Forbidden(
                "only the assigned delivery staff can update this delivery".to_string(),
            ));
        }

        if delivery.delivery_status == new_status {
            return self.view_of(delivery_id).await;
        }

        if delivery.delivery_status == DeliveryStatus::Delivered {
            return Err(WorkflowError::PreconditionFailed(
                "delivery is already delivered".to_string(),
            ));
        }

        check_move(
            delivery.delivery_status.can_advance_to(new_status),
            self.allow_rollback,
            &delivery.delivery_status,
            &new_status,
        )?;

        let delivered_at = (new_status == DeliveryStatus::Delivered).then(Utc::now);

        let updated = self
            .store
            .update_delivery(
                delivery_id,
                DeliveryPatch {
                    expected_version: delivery.version,
                    delivery_status: Some(new_status),
                    delivered_at,
                    ..Default::default()
                },
            )
            .await?;

        let audience = self.status_audience(&updated).await?;
        self.notifier.publish_to_all(
            &audience,
            &WorkflowEvent::DeliveryStatusUpdated {
                delivery_id,
                status: new_status,
            },
        );

        self.view_of(delivery_id).await
    }

    async fn load(&self, id: DeliveryId) -> Result<Delivery, WorkflowError> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or(WorkflowError::NotFound)
    }

    async fn view_of(&self, id: DeliveryId) -> Result<DeliveryView, WorkflowError> {
        self.store
            .get_delivery_view(id)
            .await?
            .ok_or(WorkflowError::NotFound)
    }

    /// Users to notify about a status change: both assignees and every
    /// manager.
    async fn status_audience(&self, delivery: &Delivery) -> Result<Vec<UserId>, WorkflowError> {
        let mut audience = vec![delivery.assigned_to_pantry];
        if let Some(courier) = delivery.assigned_to_delivery {
            audience.push(courier);
        }
        for manager in self.store.list_users_by_role(Role::Manager).await? {
            audience.push(manager.id);
        }
        Ok(audience)
    }
}

/// Shared forward-only check for both machines.
fn check_move<S: std::fmt::Display>(
    is_forward_step: bool,
    allow_rollback: bool,
    current: &S,
    target: &S,
) -> Result<(), WorkflowError> {
    if is_forward_step || allow_rollback {
        Ok(())
    } else {
        Err(WorkflowError::PreconditionFailed(format!(
            "cannot move from {current} to {target}"
        )))
    }
}
