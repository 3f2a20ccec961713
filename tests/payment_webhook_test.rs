//! Integration tests for webhook reconciliation.
//!
//! Covers idempotent redelivery, out-of-order arrival, signature
//! tampering, terminal-state immutability and notification failure
//! isolation.

mod common;

use axum::http::Method;
use common::{failed_event, response_json, sign_webhook, succeeded_event, TestApp};
use repairshop_api::entities::{address, order};
use sea_orm::EntityTrait;
use serde_json::json;
use std::sync::atomic::Ordering;

async fn checkout(app: &TestApp) -> (uuid::Uuid, String) {
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({
                "cart_line_items": [
                    {"id": "a", "name": "Case", "unit_price": "19.99", "quantity": 2}
                ],
                "currency": "EUR",
                "buyer_email": "buyer@example.com"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let order_id = body["data"]["order_id"].as_str().unwrap().parse().unwrap();
    let intent_ref = app.provider.requests.lock().unwrap().len();
    (order_id, format!("pi_test_{intent_ref}"))
}

async fn order_row(app: &TestApp, order_id: uuid::Uuid) -> order::Model {
    order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("order row")
}

#[tokio::test]
async fn succeeded_webhook_finalizes_order_and_sends_one_email() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let event = succeeded_event(&intent_ref, 3998, "eur", Some("buyer@example.com"), json!({}));
    let response = app.post_webhook(event.to_string().as_bytes()).await;
    assert_eq!(response.status(), 200);

    let row = order_row(&app, order_id).await;
    assert_eq!(row.status, "succeeded");
    assert!(row.updated_at.is_some());

    let sent = app.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].buyer_email, "buyer@example.com");
    assert_eq!(sent[0].amount_minor_units, 3998);
    assert_eq!(sent[0].currency, "EUR");
    assert_eq!(sent[0].summary.as_deref(), Some("2x Case"));
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let event = succeeded_event(&intent_ref, 3998, "eur", Some("buyer@example.com"), json!({}));
    let body = event.to_string();

    let first = app.post_webhook(body.as_bytes()).await;
    assert_eq!(first.status(), 200);
    let second = app.post_webhook(body.as_bytes()).await;
    assert_eq!(second.status(), 200, "duplicate delivery acknowledges");

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(orders.len(), 1, "no duplicate order row");
    assert_eq!(orders[0].id, order_id);
    assert_eq!(orders[0].status, "succeeded");

    assert_eq!(app.notifier.sent_count(), 1, "no second email");
}

#[tokio::test]
async fn webhook_before_initiator_reconstructs_order() {
    let app = TestApp::new().await;

    // No checkout happened from this process's point of view: the intent
    // exists only at the processor. Metadata carries the essentials
    // captured at intent creation.
    let metadata = json!({
        "buyer_email": "late@example.com",
        "item_count": "2",
        "cart_summary": "2x Case",
        "ship_name": "Jo Doe",
        "ship_line1": "Musterstr. 1",
        "ship_city": "Berlin",
        "ship_postal": "10115",
        "ship_country": "DE"
    });
    let event = succeeded_event("pi_orphan_9", 3998, "eur", None, metadata);

    let response = app.post_webhook(event.to_string().as_bytes()).await;
    assert_eq!(response.status(), 200);

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    let row = &orders[0];
    assert_eq!(row.payment_intent_ref, "pi_orphan_9");
    assert_eq!(row.status, "succeeded");
    assert_eq!(row.amount_minor_units, 3998);
    assert_eq!(row.currency, "EUR");
    assert_eq!(row.buyer_email.as_deref(), Some("late@example.com"));

    // Address rebuilt from intent metadata.
    let address_id = row.address_id.expect("address reconstructed");
    let addr = address::Entity::find_by_id(address_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(addr.line1, "Musterstr. 1");
    assert_eq!(addr.city, "Berlin");

    let sent = app.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].buyer_email, "late@example.com");
}

#[tokio::test]
async fn tampered_body_is_rejected_with_no_state_change() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let event = succeeded_event(&intent_ref, 3998, "eur", Some("buyer@example.com"), json!({}));
    let body = event.to_string();
    let ts = chrono::Utc::now().timestamp();
    let sig = sign_webhook(ts, body.as_bytes());

    // Alter the body after signing.
    let tampered = body.replace("3998", "1");
    let response = app
        .post_webhook_raw(tampered.as_bytes(), &ts.to_string(), &sig)
        .await;
    assert_eq!(response.status(), 401);

    let row = order_row(&app, order_id).await;
    assert_eq!(row.status, "created", "order unchanged after forged delivery");
    assert_eq!(app.notifier.sent_count(), 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let event = succeeded_event(&intent_ref, 3998, "eur", None, json!({}));
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(event.to_string()))
        .unwrap();
    let response = tower::ServiceExt::oneshot(
        axum::Router::new()
            .nest("/api/v1", repairshop_api::api_v1_routes())
            .with_state(app.state.clone()),
        request,
    )
    .await
    .unwrap();
    assert_eq!(response.status(), 401);

    let row = order_row(&app, order_id).await;
    assert_eq!(row.status, "created");
}

#[tokio::test]
async fn terminal_state_is_immutable() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let succeeded = succeeded_event(&intent_ref, 3998, "eur", Some("buyer@example.com"), json!({}));
    assert_eq!(
        app.post_webhook(succeeded.to_string().as_bytes()).await.status(),
        200
    );

    let before = order_row(&app, order_id).await;

    // A contradictory terminal event for the same ref is acknowledged but
    // changes nothing.
    let failed = failed_event(&intent_ref, 3998, "eur");
    assert_eq!(
        app.post_webhook(failed.to_string().as_bytes()).await.status(),
        200
    );

    let after = order_row(&app, order_id).await;
    assert_eq!(after.status, "succeeded");
    assert_eq!(after.cart_snapshot, before.cart_snapshot);
    assert_eq!(app.notifier.sent_count(), 1);
}

#[tokio::test]
async fn failed_webhook_marks_failed_without_email() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    let event = failed_event(&intent_ref, 3998, "eur");
    let response = app.post_webhook(event.to_string().as_bytes()).await;
    assert_eq!(response.status(), 200);

    let row = order_row(&app, order_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(app.notifier.sent_count(), 0);
}

#[tokio::test]
async fn unrelated_event_is_acknowledged_without_side_effects() {
    let app = TestApp::new().await;

    let event = json!({
        "id": "evt_other",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_123" } }
    });
    let response = app.post_webhook(event.to_string().as_bytes()).await;
    assert_eq!(response.status(), 200);

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(app.notifier.sent_count(), 0);
}

#[tokio::test]
async fn malformed_json_after_valid_signature_is_bad_request() {
    let app = TestApp::new().await;

    let body = b"{not json";
    let response = app.post_webhook(body).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn notification_failure_does_not_block_acknowledgment() {
    let app = TestApp::new().await;
    let (order_id, intent_ref) = checkout(&app).await;

    app.notifier.fail_next.store(true, Ordering::SeqCst);
    let event = succeeded_event(&intent_ref, 3998, "eur", Some("buyer@example.com"), json!({}));
    let response = app.post_webhook(event.to_string().as_bytes()).await;

    // The order write stands and the processor is acknowledged; the lost
    // email surfaces only as a missing confirmation.
    assert_eq!(response.status(), 200);
    let row = order_row(&app, order_id).await;
    assert_eq!(row.status, "succeeded");
    assert_eq!(app.notifier.sent_count(), 0);

    // A redelivery does not resurrect the email: the transition was won.
    let redelivery = app.post_webhook(event.to_string().as_bytes()).await;
    assert_eq!(redelivery.status(), 200);
    assert_eq!(app.notifier.sent_count(), 0);
}
