use crate::handlers::common::{
    created_response, map_service_error, session_token, success_response, validate_input,
};
use crate::{errors::ApiError, services::orders::PlaceOrderInput, AppState};
use axum::{
    extract::{Json, State},
    http::HeaderMap,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coupon", post(apply_coupon))
        .route("/order", post(place_order))
        .route("/payment-intent", post(create_payment_intent))
}

#[derive(Debug, Deserialize, Validate)]
struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    code: String,
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePaymentIntentRequest {
    #[validate(length(min = 1))]
    payment_token: String,
}

/// Evaluate a coupon against the session's cart. Dry run; nothing is
/// consumed until the order is placed.
async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    validate_input(&payload)?;

    let quote = state
        .services
        .coupon
        .apply(&token, &payload.code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(quote))
}

/// Place an order from the session's cart
async fn place_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    validate_input(&payload)?;

    let order = state
        .services
        .order
        .place_order(&token, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

/// Create a card payment intent for a pending order. Refuses orders that
/// have already settled, so a reloaded payment page cannot double charge.
async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePaymentIntentRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .order
        .get_by_payment_token(&payload.payment_token)
        .await
        .map_err(map_service_error)?;

    if order.is_paid() {
        return Err(ApiError::ServiceError(
            crate::errors::ServiceError::Conflict("Order has already been paid".to_string()),
        ));
    }

    let intent = state
        .services
        .payment
        .create_intent(
            order.total_amount,
            &order.payment_token,
            &order.order_number,
            Some(order.customer_email.as_str()),
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(intent))
}
