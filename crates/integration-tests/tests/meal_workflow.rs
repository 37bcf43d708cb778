//! End-to-end status workflow scenarios.

use axum::http::StatusCode;
use serde_json::json;

use mealtrack_core::Role;
use mealtrack_integration_tests::{SessionCookie, TestApp};

/// One manager, one pantry staff, one delivery staff, all logged in.
struct Staff {
    manager: SessionCookie,
    pantry: SessionCookie,
    courier: SessionCookie,
    pantry_id: i32,
    courier_id: i32,
}

async fn seed_staff(app: &TestApp) -> Staff {
    app.register_user("Maya Manager", "maya@hospital.test", Role::Manager)
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
        courier: app.login("dana@hospital.test", Role::Delivery).await,
        pantry_id: pantry_id.as_i32(),
        courier_id: courier_id.as_i32(),
    }
}

/// Create a patient and a diet chart; return the new delivery's id.
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
                "diseases": ["diabetes"],
                "allergies": ["peanuts"],
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
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
                "ingredients": ["oats", "milk"],
                "instructions": "no sugar",
                "assigned_pantry": staff.pantry_id,
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);

    let delivery = &response.body["delivery"];
    assert_eq!(delivery["preparation_status"], "pending");
    assert_eq!(delivery["delivery_status"], "pending");
    assert_eq!(delivery["assigned_to_pantry"]["id"], staff.pantry_id);
    assert!(delivery["assigned_to_delivery"].is_null());
    assert_eq!(delivery["diet_chart"]["patient"]["name"], "Jane Doe");
    assert_eq!(delivery["diet_chart"]["patient"]["room_number"], "204");

    delivery["id"].as_i64().expect("delivery id")
}

async fn patch_status(
    app: &TestApp,
    cookie: &SessionCookie,
    delivery_id: i64,
    field: &str,
    value: &str,
) -> mealtrack_integration_tests::TestResponse {
    app.request(
        "PATCH",
        &format!("/api/deliveries/{delivery_id}/{field}"),
        Some(cookie),
        Some(json!({ field: value })),
    )
    .await
}

async fn assign(
    app: &TestApp,
    cookie: &SessionCookie,
    delivery_id: i64,
    staff_id: i32,
) -> mealtrack_integration_tests::TestResponse {
    app.request(
        "PATCH",
        &format!("/api/deliveries/{delivery_id}/assign_delivery"),
        Some(cookie),
        Some(json!({ "assigned_to_delivery": staff_id })),
    )
    .await
}

#[tokio::test]
async fn chart_creation_yields_a_pending_delivery() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;

    create_delivery(&app, &staff).await;
}

#[tokio::test]
async fn chart_creation_is_manager_only() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    // Reuse the existing patient for the forbidden attempt.
    let response = app.get("/api/patients", Some(&staff.pantry)).await;
    let patient_id = response.body[0]["id"].as_i64().expect("patient id");

    let response = app
        .request(
            "POST",
            "/api/diet-charts",
            Some(&staff.pantry),
            Some(json!({
                "patient_id": patient_id,
                "date": "2026-03-14",
                "meal_type": "evening",
                "assigned_pantry": staff.pantry_id,
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // The delivery list is unchanged.
    let response = app.get("/api/deliveries", Some(&staff.manager)).await;
    let list = response.body.as_array().expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"].as_i64(), Some(delivery_id));
}

#[tokio::test]
async fn pantry_walks_preparation_to_ready() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let response =
        patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["preparation_status"], "preparing");

    let response =
        patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["preparation_status"], "ready");
}

#[tokio::test]
async fn preparation_cannot_skip_ahead() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let response =
        patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_role_cannot_move_preparation() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    for cookie in [&staff.manager, &staff.courier] {
        let response =
            patch_status(&app, cookie, delivery_id, "preparation_status", "preparing").await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    // State is untouched.
    let response = app.get("/api/deliveries", Some(&staff.manager)).await;
    assert_eq!(response.body[0]["preparation_status"], "pending");
}

#[tokio::test]
async fn assignment_fails_until_ready_then_succeeds() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    // Before ready: precondition failed.
    let response = assign(&app, &staff.pantry, delivery_id, staff.courier_id).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;

    let response = assign(&app, &staff.pantry, delivery_id, staff.courier_id).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["assigned_to_delivery"]["id"], staff.courier_id);

    // A second assignment is rejected.
    let response = assign(&app, &staff.pantry, delivery_id, staff.courier_id).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn manager_may_also_assign() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;

    let response = assign(&app, &staff.manager, delivery_id, staff.courier_id).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn assignee_must_hold_the_delivery_role() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;

    let response = assign(&app, &staff.pantry, delivery_id, staff.pantry_id).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn courier_walks_delivery_to_delivered() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;
    assign(&app, &staff.pantry, delivery_id, staff.courier_id).await;

    // Before assignment took effect the courier could not act; now the
    // delivery machine walks forward.
    let response =
        patch_status(&app, &staff.courier, delivery_id, "delivery_status", "in_progress").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["delivered_at"].is_null());

    let response =
        patch_status(&app, &staff.courier, delivery_id, "delivery_status", "delivered").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["delivery_status"], "delivered");
    assert!(response.body["delivered_at"].is_string());

    // Delivered is terminal.
    let response =
        patch_status(&app, &staff.courier, delivery_id, "delivery_status", "pending").await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delivery_cannot_advance_while_unassigned() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let response =
        patch_status(&app, &staff.courier, delivery_id, "delivery_status", "in_progress").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_delivery_is_not_found() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;

    let response =
        patch_status(&app, &staff.pantry, 999, "preparation_status", "preparing").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_status_value_is_validation_error() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    let response =
        patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "charring").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rollback_flag_permits_backward_preparation_moves() {
    let app = TestApp::with_rollback(true);
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    let response =
        patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "pending").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["preparation_status"], "pending");
}

#[tokio::test]
async fn lists_are_role_scoped() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    let delivery_id = create_delivery(&app, &staff).await;

    // Another pantry user sees an empty list; the assignee sees the task.
    app.register_user("Pia Pantry", "pia@hospital.test", Role::PantryStaff)
        .await;
    let other_pantry = app.login("pia@hospital.test", Role::PantryStaff).await;

    let response = app.get("/api/deliveries", Some(&other_pantry)).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(0));

    let response = app.get("/api/deliveries", Some(&staff.pantry)).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(1));

    // The courier sees nothing until assigned.
    let response = app.get("/api/deliveries", Some(&staff.courier)).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(0));

    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "preparing").await;
    patch_status(&app, &staff.pantry, delivery_id, "preparation_status", "ready").await;
    assign(&app, &staff.pantry, delivery_id, staff.courier_id).await;

    let response = app.get("/api/deliveries", Some(&staff.courier)).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(1));

    let response = app.get("/api/deliveries", Some(&staff.manager)).await;
    assert_eq!(response.body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn chart_listing_resolves_patient_and_assignee() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;
    create_delivery(&app, &staff).await;

    let response = app.get("/api/diet-charts", Some(&staff.pantry)).await;
    assert_eq!(response.status, StatusCode::OK);
    let list = response.body.as_array().expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["patient"]["name"], "Jane Doe");
    assert_eq!(list[0]["assigned_pantry"]["full_name"], "Piotr Pantry");
    assert_eq!(list[0]["meal_type"], "morning");
}

#[tokio::test]
async fn patient_mutations_are_manager_only() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;

    let body = json!({
        "name": "John Roe",
        "age": 61,
        "gender": "male",
        "room_number": "310",
        "bed_number": "1",
        "floor_number": "3",
    });

    let response = app
        .request("POST", "/api/patients", Some(&staff.pantry), Some(body.clone()))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .request("POST", "/api/patients", Some(&staff.manager), Some(body))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let patient_id = response.body["id"].as_i64().expect("patient id");

    let response = app
        .request(
            "PUT",
            &format!("/api/patients/{patient_id}"),
            Some(&staff.manager),
            Some(json!({
                "name": "John Roe",
                "age": 61,
                "gender": "male",
                "room_number": "311",
                "bed_number": "1",
                "floor_number": "3",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["room_number"], "311");
}

#[tokio::test]
async fn staff_picker_lists_by_role() {
    let app = TestApp::new();
    let staff = seed_staff(&app).await;

    let response = app.get("/api/users?role=delivery", Some(&staff.pantry)).await;
    assert_eq!(response.status, StatusCode::OK);
    let list = response.body.as_array().expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["full_name"], "Dana Delivery");

    let response = app.get("/api/users?role=chef", Some(&staff.pantry)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
