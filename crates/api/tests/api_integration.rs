//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::DEFAULT_CACHE_TTL;
use events::{EventBus, Exchange, InMemoryEventBus};
use gateway::{DEFAULT_TOLERANCE, WebhookVerifier, sign_payload};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_api_test";
const USER: &str = "user-42";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with_state() -> (axum::Router, Arc<api::AppState>, InMemoryEventBus) {
    let verifier = WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string()), DEFAULT_TOLERANCE);
    let (state, bus) = api::create_in_memory_state(verifier, DEFAULT_CACHE_TTL);
    let app = api::create_app(Arc::clone(&state), get_metrics_handle());
    (app, state, bus)
}

fn setup() -> axum::Router {
    setup_with_state().0
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", USER)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn order_body() -> Value {
    json!({
        "items": [
            {"product_id": "SKU-001", "product_name": "Widget", "quantity": 2, "unit_price": 29.99},
            {"product_id": "SKU-002", "product_name": "Gadget", "quantity": 1, "unit_price": 49.99}
        ],
        "shipping_address": {"street": "1 Main St", "city": "Springfield", "country": "US"}
    })
}

async fn create_order(app: &axum::Router) -> String {
    let (status, json) = send(app, json_request("POST", "/api/v1/orders", &order_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn create_intent(app: &axum::Router, order_id: &str, amount: f64) -> String {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/v1/payments/intent",
            &json!({"amount": amount, "order_id": order_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["payment_id"].as_str().unwrap().to_string()
}

fn webhook_request(event_id: &str, event_type: &str, object: Value, secret: &str) -> Request<Body> {
    let body = serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "data": {"object": object}
    }))
    .unwrap();
    let signature = sign_payload(&body, secret, chrono::Utc::now().timestamp()).unwrap();
    Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_readiness() {
    let app = setup();

    let (status, json) = send(&app, get_request("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ready");
    assert_eq!(json["ledger"], "ok");
    assert_eq!(json["cache"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    create_order(&app).await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn test_create_order() {
        let app = setup();

        let (status, json) = send(&app, json_request("POST", "/api/v1/orders", &order_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["user_id"], USER);
        assert_eq!(json["total_price"].as_f64(), Some(109.97));
        assert_eq!(json["billing_address"], json["shipping_address"]);
        assert!(json["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let app = setup();
        let order_id = create_order(&app).await;

        let (status, json) = send(&app, get_request(&format!("/api/v1/orders/{order_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], order_id);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let app = setup();

        let no_items = json!({"items": [], "shipping_address": {"street": "1 Main St", "city": "X"}});
        let (status, json) = send(&app, json_request("POST", "/api/v1/orders", &no_items)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("at least one item"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/orders")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&order_body()).unwrap()))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("user id"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = setup();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/orders")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_get_nonexistent_order() {
        let app = setup();
        let uri = "/api/v1/orders/00000000-0000-0000-0000-000000000000";

        let (status, json) = send(&app, get_request(uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_invalid_order_id_format() {
        let app = setup();

        let (status, _) = send(&app, get_request("/api/v1/orders/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let app = setup();
        let order_id = create_order(&app).await;
        let uri = format!("/api/v1/orders/{order_id}/status");

        let (status, _) = send(&app, json_request("PUT", &uri, &json!({"status": "delivered"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        for next in ["confirmed", "processing"] {
            let (status, json) = send(&app, json_request("PUT", &uri, &json!({"status": next}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["status"], next);
        }

        let (status, json) = send(
            &app,
            json_request(
                "PUT",
                &uri,
                &json!({"status": "shipped", "tracking_number": "1Z999"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tracking_number"], "1Z999");

        let (status, _) = send(&app, json_request("PUT", &uri, &json!({"status": "lost"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_twice_conflicts() {
        let app = setup();
        let order_id = create_order(&app).await;
        let uri = format!("/api/v1/orders/{order_id}/cancel");

        let (status, json) = send(&app, json_request("POST", &uri, &json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "cancelled");

        let (status, _) = send(&app, json_request("POST", &uri, &json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_update_recomputes_total() {
        let app = setup();
        let order_id = create_order(&app).await;

        let update = json!({
            "items": [{"product_id": "SKU-009", "product_name": "Bolt", "quantity": 3, "unit_price": 10.50}],
            "notes": "leave at the door"
        });
        let (status, json) = send(
            &app,
            json_request("PUT", &format!("/api/v1/orders/{order_id}"), &update),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_price"].as_f64(), Some(31.5));
        assert_eq!(json["notes"], "leave at the door");
    }

    #[tokio::test]
    async fn test_calculate_total() {
        let app = setup();
        let body = json!({"items": order_body()["items"]});

        let (status, json) = send(
            &app,
            json_request("POST", "/api/v1/orders/calculate-total", &body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"].as_f64(), Some(109.97));
        assert_eq!(json["item_count"], 2);

        let bad = json!({"items": [{"product_id": "SKU-1", "quantity": 0, "unit_price": 1.0}]});
        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/orders/calculate-total", &bad),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let huge = json!({"items": [
            {"product_id": "SKU-1", "product_name": "Bulk", "quantity": 4_000_000_000u32, "unit_price": 7e28}
        ]});
        let (status, json) = send(
            &app,
            json_request("POST", "/api/v1/orders/calculate-total", &huge),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("overflows"));

        let mut order = order_body();
        order["items"] = huge["items"].clone();
        let (status, _) = send(&app, json_request("POST", "/api/v1/orders", &order)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_by_user_paginates() {
        let app = setup();
        for _ in 0..3 {
            create_order(&app).await;
        }

        let (status, json) = send(
            &app,
            get_request(&format!("/api/v1/users/{USER}/orders?page=1&limit=2")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 3);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);

        let (_, json) = send(
            &app,
            get_request(&format!("/api/v1/users/{USER}/orders?page=0&limit=500")),
        )
        .await;
        assert_eq!(json["page"], 1);
        assert_eq!(json["limit"], 20);

        let (_, json) = send(&app, get_request("/api/v1/users/nobody/orders")).await;
        assert_eq!(json["total"], 0);
    }
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn test_intent_confirm_refund() {
        let app = setup();
        let payment_id = create_intent(&app, "order-1", 99.99).await;

        let (status, json) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/v1/payments/{payment_id}/confirm"),
                &json!({"payment_method": "pm_card_visa"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");

        let (status, json) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/v1/payments/{payment_id}/refund"),
                &json!({"amount": 25.00}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["payment"]["status"], "refunded");
        assert_eq!(json["payment"]["amount"].as_f64(), Some(99.99));
        assert_eq!(json["refund"]["amount"].as_f64(), Some(25.0));
        assert_eq!(json["refund"]["reason"], "requested_by_customer");

        let (status, json) = send(
            &app,
            get_request(&format!("/api/v1/payments/{payment_id}/refunds")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/v1/payments/{payment_id}/refund"),
                &json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_intent_response_carries_secret_but_payment_does_not() {
        let app = setup();
        let (status, json) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/payments/intent",
                &json!({"amount": 10.0, "order_id": "order-1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let secret = json["client_secret"].as_str().unwrap().to_string();
        assert!(!secret.is_empty());
        assert_eq!(json["payment"]["currency"], "usd");

        let payment_id = json["payment_id"].as_str().unwrap();
        let (_, stored) = send(&app, get_request(&format!("/api/v1/payments/{payment_id}"))).await;
        assert!(!stored.to_string().contains(&secret));
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let app = setup();
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/payments/intent",
                &json!({"amount": 0, "order_id": "order-1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refund_pending_payment_conflicts() {
        let app = setup();
        let payment_id = create_intent(&app, "order-1", 20.0).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/payments/{payment_id}/refund"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_payment() {
        let app = setup();

        let (status, _) = send(&app, get_request("/api/v1/payments/pi_missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let app = setup();
        create_intent(&app, "order-1", 10.0).await;
        create_intent(&app, "order-1", 11.0).await;
        create_intent(&app, "order-2", 12.0).await;

        let (status, json) = send(&app, get_request("/api/v1/payments?order_id=order-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);

        let (_, json) = send(
            &app,
            get_request("/api/v1/payments?status=pending&limit=1&offset=1"),
        )
        .await;
        assert_eq!(json["total"], 3);
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
        assert_eq!(json["page"], 2);

        let (status, _) = send(&app, get_request("/api/v1/payments?status=settled")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod webhooks {
    use super::*;

    #[tokio::test]
    async fn test_webhook_completes_payment_and_order() {
        let (app, state, bus) = setup_with_state();
        let subscription = bus
            .subscribe(domain::order::PAYMENT_SYNC_GROUP, &[Exchange::Payments])
            .await
            .unwrap();
        let sync = domain::order::PaymentSync::new(Arc::clone(&state.orders)).spawn(subscription);

        let order_id = create_order(&app).await;
        let payment_id = create_intent(&app, &order_id, 109.97).await;

        let request = webhook_request(
            "evt_1",
            "payment_intent.succeeded",
            json!({"id": payment_id, "status": "succeeded"}),
            WEBHOOK_SECRET,
        );
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "applied");

        let (_, payment) = send(&app, get_request(&format!("/api/v1/payments/{payment_id}"))).await;
        assert_eq!(payment["status"], "completed");

        let mut order_status = Value::Null;
        for _ in 0..100 {
            let (_, order) = send(&app, get_request(&format!("/api/v1/orders/{order_id}"))).await;
            order_status = order["status"].clone();
            if order_status == "confirmed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(order_status, "confirmed");

        let replay = webhook_request(
            "evt_1",
            "payment_intent.succeeded",
            json!({"id": payment_id}),
            WEBHOOK_SECRET,
        );
        let (status, json) = send(&app, replay).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "duplicate");

        sync.abort();
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let app = setup();
        let payment_id = create_intent(&app, "order-1", 5.0).await;

        let request = webhook_request(
            "evt_1",
            "payment_intent.succeeded",
            json!({"id": payment_id}),
            "whsec_wrong",
        );
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unsigned = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/stripe")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(&app, unsigned).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, payment) = send(&app, get_request(&format!("/api/v1/payments/{payment_id}"))).await;
        assert_eq!(payment["status"], "pending");
    }

    #[tokio::test]
    async fn test_out_of_order_refund_asks_for_redelivery() {
        let app = setup();
        let payment_id = create_intent(&app, "order-1", 5.0).await;

        let request = webhook_request(
            "evt_r",
            "charge.refunded",
            json!({"id": "ch_1", "payment_intent": payment_id}),
            WEBHOOK_SECRET,
        );
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_event_is_acknowledged() {
        let app = setup();

        let request = webhook_request(
            "evt_x",
            "customer.created",
            json!({"id": "cus_1"}),
            WEBHOOK_SECRET,
        );
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "ignored");
    }
}
