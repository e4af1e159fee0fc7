use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a coupon's `discount_value` is interpreted.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the cart subtotal
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `discount_value` is a fixed currency amount
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Which carts a coupon is willing to discount. Scope gates eligibility;
/// it does not change what the discount is computed against.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CouponScope {
    #[sea_orm(string_value = "all")]
    All,
    /// Needs a line whose product category is in `category_ids`
    #[sea_orm(string_value = "category")]
    Category,
    /// Needs a line whose offer is in `product_ids`
    #[sea_orm(string_value = "product")]
    Product,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[sea_orm(nullable)]
    pub min_purchase_amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub max_discount_amount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub applicable_to: CouponScope,
    /// JSON array of category UUIDs; consulted when `applicable_to` is `category`
    #[sea_orm(nullable)]
    pub category_ids: Option<Json>,
    /// JSON array of offer UUIDs; consulted when `applicable_to` is `product`
    #[sea_orm(nullable)]
    pub product_ids: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Category scope list, tolerating NULL and malformed entries
    pub fn category_id_list(&self) -> Vec<Uuid> {
        Self::parse_id_list(self.category_ids.as_ref())
    }

    /// Product scope list, tolerating NULL and malformed entries
    pub fn product_id_list(&self) -> Vec<Uuid> {
        Self::parse_id_list(self.product_ids.as_ref())
    }

    fn parse_id_list(value: Option<&Json>) -> Vec<Uuid> {
        value
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_list_parses_valid_uuids_and_skips_garbage() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let list = Model::parse_id_list(Some(&json!([a.to_string(), "not-a-uuid", b.to_string()])));
        assert_eq!(list, vec![a, b]);
    }

    #[test]
    fn test_id_list_empty_when_null_or_not_array() {
        assert!(Model::parse_id_list(None).is_empty());
        assert!(Model::parse_id_list(Some(&json!("oops"))).is_empty());
    }
}
