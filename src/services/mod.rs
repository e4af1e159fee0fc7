pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod pricing;

pub use carts::CartService;
pub use catalog::CatalogService;
pub use coupons::CouponService;
pub use orders::OrderService;
pub use payments::PaymentService;
