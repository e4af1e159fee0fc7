use crate::errors::{ApiError, ServiceError};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Header carrying the client-minted cart session token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format!("Validation failed: {}", e)))
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Extracts the session token header, rejecting requests without one.
/// Tokens are opaque; the server never mints them.
pub fn session_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::BadRequest("Missing x-session-token header".to_string()))
}

/// Standard pagination response metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Envelope for paginated list responses
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta_rounds_up() {
        let meta = PaginationMeta::new(1, 20, 41);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn test_session_token_rejects_missing_and_blank() {
        let headers = HeaderMap::new();
        assert!(session_token(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_TOKEN_HEADER, "  ".parse().unwrap());
        assert!(session_token(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_TOKEN_HEADER, "sess-abc".parse().unwrap());
        assert_eq!(session_token(&headers).unwrap(), "sess-abc");
    }
}
