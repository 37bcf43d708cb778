//! Real-time notification bus.
//!
//! Maintains a per-user room (a `tokio::sync::broadcast` channel keyed by
//! user id) and fans workflow events out to the users a change affects.
//! Joining is idempotent: subscribing gets-or-creates the room's sender,
//! and every concurrent subscription of the same user receives the same
//! events. Delivery is best-effort, at-most-once per connected session;
//! there is no replay, and a reconnecting client reconciles by re-fetching
//! its delivery list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::broadcast;

use mealtrack_core::{DeliveryId, DeliveryStatus, PreparationStatus, UserId};

use crate::models::DeliveryView;

/// Buffered events per room before slow receivers start lagging.
const ROOM_CAPACITY: usize = 64;

/// An event fanned out to affected users.
///
/// "New task" events carry the full denormalized record so the client can
/// insert a row without a refetch; status updates carry only the changed
/// field.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A delivery was created and assigned to a pantry staff member.
    NewPreparationTask { delivery: Box<DeliveryView> },
    /// A delivery became ready and was assigned to a delivery staff member.
    NewDeliveryTask { delivery: Box<DeliveryView> },
    /// The pantry assignee moved the preparation status.
    PreparationStatusUpdated {
        delivery_id: DeliveryId,
        status: PreparationStatus,
    },
    /// The delivery assignee moved the delivery status.
    DeliveryStatusUpdated {
        delivery_id: DeliveryId,
        status: DeliveryStatus,
    },
}

impl WorkflowEvent {
    /// Wire name of the event, used as the SSE `event:` field.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewPreparationTask { .. } => "new_preparation_task",
            Self::NewDeliveryTask { .. } => "new_delivery_task",
            Self::PreparationStatusUpdated { .. } => "preparation_status_updated",
            Self::DeliveryStatusUpdated { .. } => "delivery_status_updated",
        }
    }

    /// JSON payload of the event, shaped for client-side list patching.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::NewPreparationTask { delivery } | Self::NewDeliveryTask { delivery } => {
                json!({ "delivery": delivery })
            }
            Self::PreparationStatusUpdated {
                delivery_id,
                status,
            } => json!({ "delivery_id": delivery_id, "status": status }),
            Self::DeliveryStatusUpdated {
                delivery_id,
                status,
            } => json!({ "delivery_id": delivery_id, "status": status }),
        }
    }
}

/// Per-user event fan-out.
///
/// Cheaply cloneable; all clones share the same rooms. Owned by the
/// application state and handed to the workflow engine and the event
/// stream route, never a module-level singleton.
#[derive(Clone, Default)]
pub struct Notifier {
    rooms: Arc<Mutex<HashMap<UserId, broadcast::Sender<WorkflowEvent>>>>,
}

impl Notifier {
    /// Create a bus with no rooms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a user's room, creating it if needed.
    ///
    /// Idempotent per user id: repeated calls return independent receivers
    /// on the same sender, so multiple sessions of one user all see the
    /// same events.
    #[must_use]
    pub fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<WorkflowEvent> {
        // A poisoned lock still holds a usable map.
        let mut rooms = self
            .rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Emit an event to one user's room.
    ///
    /// Fire-and-forget: a user with no live sessions simply misses the
    /// event and reconciles on their next list fetch.
    pub fn publish(&self, user_id: UserId, event: &WorkflowEvent) {
        let sender = {
            let rooms = self
                .rooms
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            rooms.get(&user_id).cloned()
        };

        if let Some(sender) = sender {
            if sender.send(event.clone()).is_err() {
                tracing::debug!(user_id = %user_id, event = event.name(), "no live receivers");
            }
        }
    }

    /// Emit an event to several users' rooms, deduplicating recipients.
    pub fn publish_to_all(&self, user_ids: &[UserId], event: &WorkflowEvent) {
        let mut seen = std::collections::HashSet::new();
        for user_id in user_ids {
            if seen.insert(*user_id) {
                self.publish(*user_id, event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status_event(id: i32) -> WorkflowEvent {
        WorkflowEvent::PreparationStatusUpdated {
            delivery_id: DeliveryId::new(id),
            status: PreparationStatus::Preparing,
        }
    }

    #[tokio::test]
    async fn test_publish_without_room_is_noop() {
        let notifier = Notifier::new();
        // No one has joined; must not panic or create a room.
        notifier.publish(UserId::new(1), &status_event(10));
    }

    #[tokio::test]
    async fn test_multiple_sessions_receive_same_event() {
        let notifier = Notifier::new();
        let user = UserId::new(7);

        let mut first = notifier.subscribe(user);
        let mut second = notifier.subscribe(user);

        notifier.publish(user, &status_event(3));

        for rx in [&mut first, &mut second] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.name(), "preparation_status_updated");
        }
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let notifier = Notifier::new();
        let mut alice = notifier.subscribe(UserId::new(1));
        let mut bob = notifier.subscribe(UserId::new(2));

        notifier.publish(UserId::new(1), &status_event(5));

        assert!(alice.recv().await.is_ok());
        assert!(matches!(
            bob.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_to_all_deduplicates() {
        let notifier = Notifier::new();
        let user = UserId::new(4);
        let mut rx = notifier.subscribe(user);

        notifier.publish_to_all(&[user, user], &status_event(9));

        assert!(rx.recv().await.is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_payload_shapes() {
        let event = status_event(12);
        let payload = event.payload();
        assert_eq!(payload["delivery_id"], 12);
        assert_eq!(payload["status"], "preparing");
    }
}
