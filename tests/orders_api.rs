//! Router-level tests for the order endpoints, driven by in-memory doubles.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use order_service::{
    routes,
    test_support::{
        InMemoryOrderStore, InventoryCall, RecordingInventory, StaticCatalog, StaticIdentity,
        state_with,
    },
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "token-ada";
const OTHER_TOKEN: &str = "token-bob";

struct Harness {
    app: Router,
    store: Arc<InMemoryOrderStore>,
    catalog: Arc<StaticCatalog>,
    inventory: Option<Arc<RecordingInventory>>,
}

fn widget_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_product(1, "Widget", Decimal::new(999, 2), 5)
        .with_product(2, "Gadget", Decimal::new(2500, 2), 3)
}

fn harness(catalog: StaticCatalog, inventory: Option<RecordingInventory>, concurrency: usize) -> Harness {
    let store = Arc::new(InMemoryOrderStore::new());
    let catalog = Arc::new(catalog);
    let identity = Arc::new(
        StaticIdentity::new()
            .with_token(TOKEN, 7, "ada@example.com")
            .with_token(OTHER_TOKEN, 8, "bob@example.com"),
    );
    let inventory = inventory.map(Arc::new);
    let state = state_with(
        store.clone(),
        catalog.clone(),
        identity,
        inventory.clone(),
        concurrency,
    );
    Harness {
        app: routes::app(state),
        store,
        catalog,
        inventory,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn creates_order_priced_from_catalog_snapshot() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({
            "items": [{"product_id": 1, "quantity": 2}],
            "shipping_address": "1 Main St"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Order created successfully");
    let order = &body["data"]["order"];
    assert_eq!(order["user_id"], 7);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_amount"], "19.98");
    assert_eq!(order["shipping_address"], "1 Main St");

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], 1);
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["price"], "9.99");
    assert_eq!(items[0]["order_id"], order["id"]);

    assert_eq!(h.store.order_count(), 1);
    assert_eq!(h.store.item_count(), 1);
}

#[tokio::test]
async fn total_is_exact_across_several_lines() {
    let h = harness(widget_catalog(), None, 2);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 1, "quantity": 3},
            {"product_id": 2, "quantity": 2}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["order"]["total_amount"], "79.97");
    let products: Vec<i64> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["product_id"].as_i64().unwrap())
        .collect();
    assert_eq!(products, vec![1, 2]);
}

#[tokio::test]
async fn insufficient_stock_names_product_and_available_quantity() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [{"product_id": 1, "quantity": 10}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient stock for product Widget. Available: 5");
    assert_eq!(body["data"]["code"], "bad_request");
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn total_beyond_storable_amount_is_bad_request() {
    let catalog = StaticCatalog::new().with_product(9, "Yacht", Decimal::new(10_000_000, 2), 300_000);
    let h = harness(catalog, None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [{"product_id": 9, "quantity": 200_000}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Order total exceeds the supported amount");
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [{"product_id": 42, "quantity": 1}]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product 42 not found");
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.item_count(), 0);
}

#[tokio::test]
async fn empty_item_list_is_rejected_without_catalog_calls() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": []})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Order must contain at least one item");
    assert!(h.catalog.calls().is_empty());
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn one_non_positive_quantity_voids_the_request() {
    let h = harness(widget_catalog(), None, 4);

    for quantity in [0, -3] {
        let (status, body) = send(
            &h.app,
            "POST",
            "/orders",
            Some(TOKEN),
            Some(json!({"items": [
                {"product_id": 1, "quantity": 1},
                {"product_id": 2, "quantity": quantity}
            ]})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Quantity must be greater than 0");
    }
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.store.item_count(), 0);
}

#[tokio::test]
async fn missing_or_invalid_credential_is_unauthorized() {
    let h = harness(widget_catalog(), None, 4);
    let items = json!({"items": [{"product_id": 1, "quantity": 1}]});

    let (status, body) = send(&h.app, "POST", "/orders", None, Some(items.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"]["code"], "unauthorized");

    let (status, body) = send(&h.app, "POST", "/orders", Some("forged"), Some(items)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");

    let (status, _) = send(
        &h.app,
        "POST",
        "/orders",
        None,
        Some(json!({"items": []})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(h.catalog.calls().is_empty());
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn catalog_outage_is_unavailable() {
    let h = harness(widget_catalog().with_outage(2), None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 1, "quantity": 1},
            {"product_id": 2, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["code"], "unavailable");
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn earliest_failing_line_decides_the_error_under_concurrency() {
    // Line 1 fails slowly, line 2 fails immediately; line 1 must still win.
    let catalog = widget_catalog()
        .with_outage(3)
        .with_delay(3, Duration::from_millis(50));
    let h = harness(catalog, None, 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 3, "quantity": 1},
            {"product_id": 42, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["message"],
        "Catalog service unavailable while validating product 3"
    );
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn sequential_lookups_stop_at_first_failure() {
    let h = harness(widget_catalog(), None, 1);

    let (status, _) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 42, "quantity": 1},
            {"product_id": 1, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.catalog.calls(), vec![42]);
}

#[tokio::test]
async fn get_order_is_idempotent_and_scoped_to_owner() {
    let h = harness(widget_catalog(), None, 4);
    let (_, created) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [{"product_id": 1, "quantity": 2}]})),
    )
    .await;
    let id = created["data"]["order"]["id"].as_i64().unwrap();
    let uri = format!("/orders/{id}");

    let (first_status, first) = send(&h.app, "GET", &uri, Some(TOKEN), None).await;
    let (second_status, second) = send(&h.app, "GET", &uri, Some(TOKEN), None).await;
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first["data"], created["data"]);

    let (status, body) = send(&h.app, "GET", &uri, Some(OTHER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Order not found");
}

#[tokio::test]
async fn non_numeric_order_id_is_bad_request() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(&h.app, "GET", "/orders/abc", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["code"], "bad_request");
}

#[tokio::test]
async fn lists_orders_with_status_filter_and_paging() {
    let h = harness(widget_catalog(), None, 4);
    for _ in 0..3 {
        let (status, _) = send(
            &h.app,
            "POST",
            "/orders",
            Some(TOKEN),
            Some(json!({"items": [{"product_id": 1, "quantity": 1}]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = send(
        &h.app,
        "PATCH",
        "/orders/1/status",
        Some(TOKEN),
        Some(json!({"status": "shipped"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.app, "GET", "/orders?per_page=2", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["per_page"], 2);
    let ids: Vec<i64> = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["order"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2]);

    let (_, body) = send(
        &h.app,
        "GET",
        "/orders?status=shipped&sort_order=asc",
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["order"]["id"], 1);
    assert_eq!(body["data"]["items"][0]["items"][0]["price"], "9.99");

    let (status, _) = send(&h.app, "GET", "/orders?status=lost", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&h.app, "GET", "/orders", Some(OTHER_TOKEN), None).await;
    assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn status_update_accepts_known_values_only() {
    let h = harness(widget_catalog(), None, 4);
    send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [{"product_id": 1, "quantity": 1}]})),
    )
    .await;

    let (status, body) = send(
        &h.app,
        "PATCH",
        "/orders/1/status",
        Some(TOKEN),
        Some(json!({"status": "teleported"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Invalid status. Must be one of: pending, processing, shipped, delivered, cancelled"
    );

    // Transitions are permissive: delivered may go back to pending.
    for next in ["delivered", "pending"] {
        let (status, body) = send(
            &h.app,
            "PATCH",
            "/orders/1/status",
            Some(TOKEN),
            Some(json!({"status": next})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Order status updated successfully");
        assert_eq!(body["data"]["status"], next);
    }

    let (status, _) = send(
        &h.app,
        "PATCH",
        "/orders/99/status",
        Some(TOKEN),
        Some(json!({"status": "shipped"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_reservation_releases_earlier_lines() {
    let h = harness(widget_catalog(), Some(RecordingInventory::new().rejecting(2)), 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 1, "quantity": 2},
            {"product_id": 2, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["data"]["code"], "conflict");
    let inventory = h.inventory.as_ref().unwrap();
    assert_eq!(
        inventory.calls(),
        vec![
            InventoryCall::Reserve { product_id: 1, quantity: 2 },
            InventoryCall::Release { product_id: 1, quantity: 2 },
        ]
    );
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn timed_out_reservation_is_released_with_earlier_lines() {
    let h = harness(widget_catalog(), Some(RecordingInventory::new().timing_out(2)), 4);

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 1, "quantity": 2},
            {"product_id": 2, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["data"]["code"], "unavailable");
    let inventory = h.inventory.as_ref().unwrap();
    assert_eq!(
        inventory.calls(),
        vec![
            InventoryCall::Reserve { product_id: 1, quantity: 2 },
            InventoryCall::Reserve { product_id: 2, quantity: 1 },
            InventoryCall::Release { product_id: 1, quantity: 2 },
            InventoryCall::Release { product_id: 2, quantity: 1 },
        ]
    );
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn storage_failure_releases_every_reservation() {
    let h = harness(widget_catalog(), Some(RecordingInventory::new()), 4);
    h.store.fail_creates();

    let (status, body) = send(
        &h.app,
        "POST",
        "/orders",
        Some(TOKEN),
        Some(json!({"items": [
            {"product_id": 1, "quantity": 2},
            {"product_id": 2, "quantity": 1}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    let inventory = h.inventory.as_ref().unwrap();
    assert_eq!(
        inventory.calls(),
        vec![
            InventoryCall::Reserve { product_id: 1, quantity: 2 },
            InventoryCall::Reserve { product_id: 2, quantity: 1 },
            InventoryCall::Release { product_id: 1, quantity: 2 },
            InventoryCall::Release { product_id: 2, quantity: 1 },
        ]
    );
}

#[tokio::test]
async fn unknown_route_falls_back_to_not_found() {
    let h = harness(widget_catalog(), None, 4);

    let (status, body) = send(&h.app, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["code"], "not_found");
}
