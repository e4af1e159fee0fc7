pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CartService, CatalogService, CouponService, OrderService, PaymentService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub coupon: Arc<CouponService>,
    pub order: Arc<OrderService>,
    pub payment: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            coupon: Arc::new(CouponService::new(db_pool.clone(), event_sender.clone())),
            order: Arc::new(OrderService::new(db_pool, event_sender.clone())),
            payment: Arc::new(PaymentService::from_config(config, event_sender)),
        }
    }
}
