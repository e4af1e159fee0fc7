use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationMeta,
};
use crate::{
    entities::order::OrderStatus,
    errors::ApiError,
    services::orders::{CreatePaymentLinkInput, ListOrdersQuery},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/payment-link", post(create_payment_link))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
}

/// List orders, newest first
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let (orders, total) = state
        .services
        .order
        .list_orders(query)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse {
        data: orders,
        meta: PaginationMeta::new(page, per_page, total),
    }))
}

/// Get one order by id
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_order(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

/// Create a pending order backing a payment link
async fn create_payment_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePaymentLinkInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .order
        .create_payment_link_order(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

/// Advance an order's lifecycle status
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .update_status(id, payload.status)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}
