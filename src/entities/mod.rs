pub mod cart_item;
pub mod coupon;
pub mod offer;
pub mod order;
pub mod product;

pub use cart_item::Entity as CartItem;
pub use coupon::Entity as Coupon;
pub use offer::Entity as Offer;
pub use order::Entity as Order;
pub use product::Entity as Product;
