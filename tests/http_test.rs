mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use paycore::adapters::sandbox::SIGNATURE_HEADER;
use paycore::transport::http::router;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    router(h.state.clone(), Duration::from_secs(5))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn create_body(amount: i64) -> Value {
    json!({
        "order_id": "order_http",
        "user_id": "user_1",
        "method_id": CARD,
        "amount": amount,
        "currency": "usd",
    })
}

#[tokio::test]
async fn create_intent_returns_transaction_and_fees() {
    let h = harness();
    let (status, body) = send(app(&h), post_json("/transactions", create_body(10_000))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "processing");
    assert_eq!(body["data"]["fees"]["fee"], 320);
    assert_eq!(body["data"]["fees"]["net"], 9_680);
    assert_eq!(body["data"]["provider_payload"]["status"], "requires_confirmation");
}

#[tokio::test]
async fn validation_errors_use_the_error_shape() {
    let h = harness();
    let (status, body) = send(app(&h), post_json("/transactions", create_body(50))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("outside"));

    let (status, body) = send(app(&h), post_json("/transactions", json!({ "order_id": 1 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn unknown_transaction_is_404() {
    let h = harness();
    let uri = format!("/transactions/{}", uuid::Uuid::now_v7());
    let (status, body) = send(app(&h), get(&uri)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(app(&h), get("/transactions/not-a-uuid")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn confirm_twice_is_409() {
    let h = harness();
    let txn = processing_txn(&h, 10_000).await;
    let uri = format!("/transactions/{}/confirm", txn.id);

    let confirm = Request::post(&uri).body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), confirm).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    let again = Request::post(&uri).body(Body::empty()).unwrap();
    let (status, body) = send(app(&h), again).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "state_error");
}

#[tokio::test]
async fn refund_and_detail_views() {
    let h = harness();
    let txn = completed_txn(&h, 10_000).await;

    let (status, body) = send(
        app(&h),
        post_json(&format!("/transactions/{}/refunds", txn.id), json!({ "amount": 2_500 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["refund"]["reason"], "requested_by_customer");
    assert_eq!(body["data"]["transaction"]["status"], "partially_refunded");

    let (status, body) = send(app(&h), get(&format!("/transactions/{}", txn.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transaction"]["refunded_amount"], 2_500);
    assert_eq!(body["data"]["refunds"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["provider_payload"]["status"], "succeeded");
}

#[tokio::test]
async fn declined_gateway_call_is_502() {
    let h = harness();
    let mut body = create_body(10_000);
    body["extra"] = json!({ "simulate": "decline" });

    let (status, body) = send(app(&h), post_json("/transactions", body)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "gateway_error");
}

#[tokio::test]
async fn unfinished_confirmation_is_202() {
    let h = harness();
    let txn = processing_txn(&h, 10_000).await;

    let (status, body) = send(
        app(&h),
        post_json(
            &format!("/transactions/{}/confirm", txn.id),
            json!({ "simulate": "in_progress" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["error"]["code"], "gateway_error");
    assert_eq!(reload(&h, &txn).await.status.as_str(), "processing");
}

#[tokio::test]
async fn methods_history_and_stats() {
    let h = harness();
    processing_txn(&h, 10_000).await;

    let (status, body) = send(app(&h), get("/methods?currency=usd&country=US")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(app(&h), get("/methods?currency=xyz&country=US")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(app(&h), get("/transactions?user_id=user_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(app(&h), get("/transactions?limit=0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(app(&h), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["window_days"], 30);
    assert_eq!(body["data"]["total"]["count"], 1);
}

#[tokio::test]
async fn webhook_signature_and_provider_checks() {
    let h = harness();
    let txn = processing_txn(&h, 10_000).await;
    let payload = payment_event("evt_http", "payment.succeeded", &txn);

    let forged = Request::post("/webhooks/sandbox")
        .header(SIGNATURE_HEADER, "bad")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, body) = send(app(&h), forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "signature_error");

    let unknown = Request::post("/webhooks/paypal")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _) = send(app(&h), unknown).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let signed = Request::post("/webhooks/sandbox")
        .header(SIGNATURE_HEADER, h.sandbox.sign(&payload))
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = send(app(&h), signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicate"], false);
    assert_eq!(body["data"]["result"]["result"], "applied");
    assert_eq!(reload(&h, &txn).await.status.as_str(), "completed");
}
