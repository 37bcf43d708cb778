//! Event fan-out tests.
//!
//! Subscribes test receivers to user rooms directly and drives the HTTP
//! API, asserting that the right users hear about the right changes.

use axum::http::StatusCode;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use mealtrack_core::{Role, UserId};
use mealtrack_integration_tests::{SessionCookie, TestApp};

struct Staff {
    manager: SessionCookie,
    pantry: SessionCookie,
    manager_id: UserId,
    pantry_id: UserId,
    courier_id: UserId,
}

async fn seed_staff(app: &TestApp) -> Staff {
    let manager_id = app
        .register_user("Maya Manager", "maya@hospital.test", Role::Manager)
        .await;
    let pantry_id = app
        .register_user("Piotr Pantry", "piotr@hospital.test", Role::PantryStaff)
        .await;
    let courier_id = app
        .register_user("Dana Delivery", "dana@hospital.test", Role::Delivery)
        .await;

    Staff {
        manager: app.login("maya@hospital.test", Role::Manager).await,
        pantry: app.login("piotr@hospital.test", Role::PantryStaff).await,
        manager_id,
        pantry_id,
        courier_id,
    }
}

async fn create_delivery(app: &TestApp, staff: &Staff) -> i64 {
    let response = app
        .request(
            "POST",
            "/api/patients",
            Some(&staff.manager),
            Some(json!({
                "name": "Jane Doe",
                "age": 54,
                "gender": "female",
                "room_number": "204",
                "bed_number": "2",
                "floor_number": "2",
            })),
        )
        .await;
    let patient_id = response.body["id"].as_i64().expect("patient id");

    let response = app
        .request(
            "POST",
            "/api/diet-charts",
            Some(&staff.manager),
            Some(json!({
                "patient_id": patient_id,
                "date": "2026-03-14",
                "meal_type": "morning",
                "assigned_pantry": staff.pantry_id,
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.body["delivery"]["id"].as_i64().expect("delivery id")
}

#[tokio::test]
async fn chart_creation_notifies_the_pantry_assignee() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let mut pantry_rx = app.notifier().subscribe(staff.pantry_id);
    let mut manager_rx = app.notifier().subscribe(staff.manager_id);

    create_delivery(&app, &staff).await;

    let event = pantry_rx.recv().await.expect("pantry event");
    assert_eq!(event.name(), "new_preparation_task");
    let payload = event.payload();
    assert_eq!(payload["delivery"]["preparation_status"], "pending");
    assert_eq!(payload["delivery"]["diet_chart"]["patient"]["name"], "Jane Doe");

    // The creating manager is not notified of their own creation.
    assert!(matches!(manager_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn status_updates_reach_assignees_and_managers() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let mut pantry_rx = app.notifier().subscribe(staff.pantry_id);
    let mut manager_rx = app.notifier().subscribe(staff.manager_id);
    let mut courier_rx = app.notifier().subscribe(staff.courier_id);

    let response = app
        .request(
            "PATCH",
            &format!("/api/deliveries/{delivery_id}/preparation_status"),
            Some(&staff.pantry),
            Some(json!({ "preparation_status": "preparing" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    for rx in [&mut pantry_rx, &mut manager_rx] {
        let event = rx.recv().await.expect("status event");
        assert_eq!(event.name(), "preparation_status_updated");
        let payload = event.payload();
        assert_eq!(payload["delivery_id"].as_i64(), Some(delivery_id));
        assert_eq!(payload["status"], "preparing");
    }

    // No delivery assignee yet, so the courier hears nothing.
    assert!(matches!(courier_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn assignment_notifies_every_session_of_the_courier() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    for status in ["preparing", "ready"] {
        app.request(
            "PATCH",
            &format!("/api/deliveries/{delivery_id}/preparation_status"),
            Some(&staff.pantry),
            Some(json!({ "preparation_status": status })),
        )
        .await;
    }

    // The same courier joined from two devices; both must hear it.
    let mut phone_rx = app.notifier().subscribe(staff.courier_id);
    let mut desk_rx = app.notifier().subscribe(staff.courier_id);

    let response = app
        .request(
            "PATCH",
            &format!("/api/deliveries/{delivery_id}/assign_delivery"),
            Some(&staff.pantry),
            Some(json!({ "assigned_to_delivery": staff.courier_id })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    for rx in [&mut phone_rx, &mut desk_rx] {
        let event = rx.recv().await.expect("assignment event");
        assert_eq!(event.name(), "new_delivery_task");
        let payload = event.payload();
        assert_eq!(payload["delivery"]["id"].as_i64(), Some(delivery_id));
        assert_eq!(payload["delivery"]["preparation_status"], "ready");
    }
}

#[tokio::test]
async fn idempotent_reapply_emits_no_duplicate_event() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    app.request(
        "PATCH",
        &format!("/api/deliveries/{delivery_id}/preparation_status"),
        Some(&staff.pantry),
        Some(json!({ "preparation_status": "preparing" })),
    )
    .await;

    let mut pantry_rx = app.notifier().subscribe(staff.pantry_id);

    let response = app
        .request(
            "PATCH",
            &format!("/api/deliveries/{delivery_id}/preparation_status"),
            Some(&staff.pantry),
            Some(json!({ "preparation_status": "preparing" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["preparation_status"], "preparing");

    assert!(matches!(pantry_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn failed_transition_emits_nothing() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let mut pantry_rx = app.notifier().subscribe(staff.pantry_id);
    let mut manager_rx = app.notifier().subscribe(staff.manager_id);

    // Skipping ahead fails and must stay silent.
    let response = app
        .request(
            "PATCH",
            &format!("/api/deliveries/{delivery_id}/preparation_status"),
            Some(&staff.pantry),
            Some(json!({ "preparation_status": "ready" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    assert!(matches!(pantry_rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(manager_rx.try_recv(), Err(TryRecvError::Empty)));
}
