use crate::handlers::common::{
    map_service_error, no_content_response, session_token, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    services::carts::{AddItemInput, UpdateQuantityInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for cart endpoints. Every route is scoped to the
/// session named by the x-session-token header.
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/clear", post(clear_cart))
}

/// Get the session's cart with current pricing
async fn get_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    let cart = state
        .services
        .cart
        .get_cart(&token)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Add an offer to the cart (or bump its quantity)
async fn add_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AddItemInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .add_item(&token, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Set a line's quantity; zero removes it
async fn update_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    validate_input(&payload)?;

    let cart = state
        .services
        .cart
        .update_quantity(&token, item_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Remove a line from the cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    let cart = state
        .services
        .cart
        .remove_item(&token, item_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Empty the session's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let token = session_token(&headers)?;
    state
        .services
        .cart
        .clear_cart(&token)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
