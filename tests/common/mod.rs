use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db,
    entities::{
        coupon::{self, CouponScope, DiscountType},
        offer, product,
    },
    events::{self, EventSender},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Test harness backed by a file-based SQLite database in a temp directory.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: tempfile::TempDir,
}

/// Seed parameters for a coupon. Defaults describe a live, unrestricted
/// 10 percent code.
pub struct CouponSeed {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    pub valid_from: chrono::DateTime<Utc>,
    pub valid_until: chrono::DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub applicable_to: CouponScope,
    pub category_ids: Option<Value>,
    pub product_ids: Option<Value>,
}

impl Default for CouponSeed {
    fn default() -> Self {
        Self {
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(10),
            min_purchase_amount: None,
            max_discount_amount: None,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(30),
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            applicable_to: CouponScope::All,
            category_ids: None,
            product_ids: None,
        }
    }
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application, customizing the config before startup.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = Arc::new(AppState::new(db_arc, Arc::new(cfg), event_sender));
        let router = storefront_api::app(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Send a JSON request, optionally scoped to a cart session.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        session: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = session {
            builder = builder.header("x-session-token", token);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a request with arbitrary extra headers (webhook tests).
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seeds an active product (optionally categorized) with one offer.
    pub async fn seed_offer(
        &self,
        name: &str,
        price: Decimal,
        category_id: Option<Uuid>,
    ) -> offer::Model {
        let product_row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            category_id: Set(category_id),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests");

        offer::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_row.id),
            title: Set(format!("{} - standard", name)),
            price: Set(price),
            stock_count: Set(100),
            is_available: Set(true),
            image_url: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed offer for tests")
    }

    /// Seeds an offer whose product is flagged inactive.
    pub async fn seed_inactive_offer(&self, name: &str, price: Decimal) -> offer::Model {
        let product_row = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            category_id: Set(None),
            is_active: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests");

        offer::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_row.id),
            title: Set(format!("{} - standard", name)),
            price: Set(price),
            stock_count: Set(100),
            is_available: Set(true),
            image_url: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed offer for tests")
    }

    pub async fn seed_coupon(&self, seed: CouponSeed) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code),
            discount_type: Set(seed.discount_type),
            discount_value: Set(seed.discount_value),
            min_purchase_amount: Set(seed.min_purchase_amount),
            max_discount_amount: Set(seed.max_discount_amount),
            valid_from: Set(seed.valid_from),
            valid_until: Set(seed.valid_until),
            usage_limit: Set(seed.usage_limit),
            usage_count: Set(seed.usage_count),
            is_active: Set(seed.is_active),
            applicable_to: Set(seed.applicable_to),
            category_ids: Set(seed.category_ids),
            product_ids: Set(seed.product_ids),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon for tests")
    }

    /// Adds an offer to the given session's cart through the API.
    pub async fn add_to_cart(&self, session: &str, offer_id: Uuid, quantity: i32) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(serde_json::json!({ "offer_id": offer_id, "quantity": quantity })),
                Some(session),
            )
            .await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        body_json(response).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is valid json")
}

/// Parses a JSON field serialized from a Decimal, independent of scale.
#[allow(dead_code)]
pub fn dec_field(value: &Value, key: &str) -> Decimal {
    value[key]
        .as_str()
        .unwrap_or_else(|| panic!("field {} is not a decimal string: {}", key, value))
        .parse()
        .expect("decimal field parses")
}
