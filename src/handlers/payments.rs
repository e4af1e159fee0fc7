use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    errors::{ApiError, ServiceError},
    services::payments::verify_stripe_signature,
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(stripe_webhook))
        .route("/:token", get(get_order_for_payment))
        .route("/:token/confirm", post(confirm_payment))
}

#[derive(Debug, Deserialize, Validate)]
struct ConfirmPaymentRequest {
    #[validate(length(min = 1))]
    payment_intent_id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Fetch the order behind a payment link or payment page
async fn get_order_for_payment(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_by_payment_token(&token)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Client-side confirmation fallback after the processor redirects back.
/// The webhook remains authoritative; this call is idempotent.
async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .order
        .confirm_payment(&token, &payload.payment_intent_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Processor webhook. Verifies the signature against the raw body, then
/// settles the order named in the intent's metadata.
async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| map_service_error(ServiceError::PaymentNotConfigured))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            map_service_error(ServiceError::Unauthorized(
                "Missing stripe-signature header".to_string(),
            ))
        })?;

    verify_stripe_signature(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs,
        Utc::now(),
    )
    .map_err(map_service_error)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    if event.event_type == "payment_intent.succeeded" {
        match event.data.object.metadata.get("payment_token") {
            Some(token) => {
                match state
                    .services
                    .order
                    .confirm_payment(token, &event.data.object.id)
                    .await
                {
                    Ok(order) => {
                        info!(order_number = %order.order_number, "Webhook settled payment")
                    }
                    // Acknowledge anyway; the processor retries on non-2xx
                    // and an unknown token will never become known.
                    Err(err) => warn!("Webhook could not settle order: {}", err),
                }
            }
            None => warn!(intent_id = %event.data.object.id, "Webhook intent has no payment_token"),
        }
    }

    Ok(success_response(serde_json::json!({ "received": true })))
}
