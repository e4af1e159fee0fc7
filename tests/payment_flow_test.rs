mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{body_json, TestApp};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use serde_json::json;
use sha2::Sha256;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn stripe_signature(payload: &[u8], secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

async fn app_with_stripe(api_base: &str) -> TestApp {
    let api_base = api_base.to_string();
    TestApp::with_config(move |cfg| {
        cfg.stripe_secret_key = Some("sk_test_key".to_string());
        cfg.stripe_api_base = api_base;
        cfg.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());
    })
    .await
}

async fn place_pending_order(app: &TestApp) -> serde_json::Value {
    let offer = app.seed_offer("Walnut desk", dec!(120.50), None).await;
    app.add_to_cart("sess-pay", offer.id, 1).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/order",
            Some(json!({
                "customer_name": "Ada Lovelace",
                "customer_email": "ada@example.com",
            })),
            Some("sess-pay"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn payment_intent_is_created_in_minor_units() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_key"))
        .and(body_string_contains("amount=12050"))
        .and(body_string_contains("currency=usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_abc",
            "client_secret": "pi_abc_secret_xyz",
            "amount": 12050,
            "currency": "usd",
            "status": "requires_payment_method",
        })))
        .expect(1)
        .mount(&stripe)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({ "payment_token": token })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let intent = body_json(response).await;
    assert_eq!(intent["id"], json!("pi_abc"));
    assert_eq!(intent["client_secret"], json!("pi_abc_secret_xyz"));
    assert_eq!(intent["amount"], 12050);
}

#[tokio::test]
async fn processor_rejection_surfaces_as_payment_failure() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "message": "Your card was declined." }
        })))
        .mount(&stripe)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({ "payment_token": token })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["message"], json!("Your card was declined."));
}

#[tokio::test]
async fn unconfigured_gateway_is_a_server_side_error() {
    let app = TestApp::new().await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({ "payment_token": token })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], json!("payment_not_configured"));
}

#[tokio::test]
async fn settled_order_refuses_a_new_intent() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/payments/{}/confirm", token),
            Some(json!({ "payment_intent_id": "pi_done" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/payment-intent",
            Some(json!({ "payment_token": token })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn signed_webhook_settles_the_order() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    let payload = serde_json::to_vec(&json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_webhook",
            "metadata": { "payment_token": token },
        }},
    }))
    .unwrap();
    let signature = stripe_signature(&payload, WEBHOOK_SECRET);

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/payments/webhook",
            payload,
            &[("stripe-signature", signature.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let settled = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/payments/{}", token),
            None,
            None,
        )
        .await,
    )
    .await;
    assert_eq!(settled["status"], json!("processing"));
    assert_eq!(settled["payment_method"], json!("stripe"));
    assert_eq!(settled["payment_intent_id"], json!("pi_webhook"));
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;
    let order = place_pending_order(&app).await;
    let token = order["payment_token"].as_str().unwrap();

    let payload = serde_json::to_vec(&json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_evil",
            "metadata": { "payment_token": token },
        }},
    }))
    .unwrap();
    let signature = stripe_signature(&payload, "whsec_wrong_secret");

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/payments/webhook",
            payload,
            &[("stripe-signature", signature.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Order stays pending
    let pending = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/payments/{}", token),
            None,
            None,
        )
        .await,
    )
    .await;
    assert_eq!(pending["status"], json!("pending"));
}

#[tokio::test]
async fn unrelated_webhook_events_are_acknowledged() {
    let stripe = MockServer::start().await;
    let app = app_with_stripe(&stripe.uri()).await;

    let payload = serde_json::to_vec(&json!({
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_123" } },
    }))
    .unwrap();
    let signature = stripe_signature(&payload, WEBHOOK_SECRET);

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/payments/webhook",
            payload,
            &[("stripe-signature", signature.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["received"], json!(true));
}
