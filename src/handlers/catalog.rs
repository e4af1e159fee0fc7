use crate::handlers::common::{map_service_error, success_response};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_offers))
        .route("/:id", get(get_offer))
}

/// List purchasable offers
async fn list_offers(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let offers = state
        .services
        .catalog
        .list_offers()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(offers))
}

/// Get a single offer
async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let offer = state
        .services
        .catalog
        .get_offer(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(offer))
}
