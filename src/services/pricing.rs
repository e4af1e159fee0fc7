//! Pure price arithmetic shared by the cart, coupon, and order services.
//!
//! Everything here is side-effect free and operates on [`CartLine`] values
//! already loaded from the database, so the math is trivially unit-testable.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::coupon::{self, CouponScope, DiscountType};

/// A cart line joined with its offer and product, as priced at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub offer_id: Uuid,
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    pub product_name: String,
    pub offer_title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Computed totals for a cart, with or without a coupon applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

/// Sum of unit price times quantity over all lines.
pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

/// Whether a coupon's scope admits the cart at all. `all` always does;
/// `category` needs at least one line whose product category is listed,
/// `product` at least one line whose offer is listed. Scope is a pass/fail
/// gate only — a coupon that passes discounts the full subtotal.
pub fn scope_matches(lines: &[CartLine], coupon: &coupon::Model) -> bool {
    match coupon.applicable_to {
        CouponScope::All => true,
        CouponScope::Category => {
            let categories = coupon.category_id_list();
            lines
                .iter()
                .any(|l| l.category_id.map_or(false, |c| categories.contains(&c)))
        }
        CouponScope::Product => {
            let offers = coupon.product_id_list();
            lines.iter().any(|l| offers.contains(&l.offer_id))
        }
    }
}

/// Discount produced by a coupon against the cart subtotal. Percentage
/// discounts are capped by `max_discount_amount`; fixed discounts are taken
/// at face value and only the final total is clamped.
pub fn discount_amount(coupon: &coupon::Model, subtotal: Decimal) -> Decimal {
    match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * coupon.discount_value / Decimal::from(100);
            match coupon.max_discount_amount {
                Some(cap) if raw > cap => cap,
                _ => raw,
            }
        }
        DiscountType::Fixed => coupon.discount_value,
    }
}

/// Order total, never below zero even when a fixed discount exceeds the
/// subtotal.
pub fn total(subtotal: Decimal, discount: Decimal) -> Decimal {
    (subtotal - discount).max(Decimal::ZERO)
}

/// Converts a major-unit amount to integer minor units (cents), rounding
/// halves away from zero the way payment processors expect.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(product_id: Uuid, category_id: Option<Uuid>, price: Decimal, qty: i32) -> CartLine {
        CartLine {
            item_id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            product_id,
            category_id,
            product_name: "p".to_string(),
            offer_title: "o".to_string(),
            unit_price: price,
            quantity: qty,
            image_url: None,
        }
    }

    fn coupon_model(
        discount_type: DiscountType,
        value: Decimal,
        max: Option<Decimal>,
        scope: CouponScope,
    ) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_type,
            discount_value: value,
            min_purchase_amount: None,
            max_discount_amount: max,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(1),
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            applicable_to: scope,
            category_ids: None,
            product_ids: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_subtotal_is_order_independent() {
        let a = line(Uuid::new_v4(), None, dec!(10.50), 2);
        let b = line(Uuid::new_v4(), None, dec!(3.25), 1);
        let c = line(Uuid::new_v4(), None, dec!(99.99), 3);
        let forward = subtotal(&[a.clone(), b.clone(), c.clone()]);
        let reversed = subtotal(&[c, b, a]);
        assert_eq!(forward, reversed);
        assert_eq!(forward, dec!(324.22));
    }

    #[test]
    fn test_percentage_discount_respects_cap() {
        let coupon = coupon_model(
            DiscountType::Percentage,
            dec!(20),
            Some(dec!(30)),
            CouponScope::All,
        );
        // 20% of 1000 is 200, capped at 30
        assert_eq!(discount_amount(&coupon, dec!(1000)), dec!(30));
        // 20% of 100 is 20, under the cap
        assert_eq!(discount_amount(&coupon, dec!(100)), dec!(20));
    }

    #[test]
    fn test_fixed_discount_ignores_cap_and_total_clamps_to_zero() {
        let coupon = coupon_model(DiscountType::Fixed, dec!(500), Some(dec!(10)), CouponScope::All);
        let discount = discount_amount(&coupon, dec!(120));
        assert_eq!(discount, dec!(500));
        assert_eq!(total(dec!(120), discount), Decimal::ZERO);
    }

    #[test]
    fn test_category_scope_is_a_gate_not_a_base() {
        let cat = Uuid::new_v4();
        let mut coupon = coupon_model(DiscountType::Percentage, dec!(10), None, CouponScope::Category);
        coupon.category_ids = Some(json!([cat.to_string()]));

        let lines = vec![
            line(Uuid::new_v4(), Some(cat), dec!(100), 1),
            line(Uuid::new_v4(), Some(Uuid::new_v4()), dec!(50), 2),
            line(Uuid::new_v4(), None, dec!(25), 1),
        ];
        assert!(scope_matches(&lines, &coupon));
        // One matching line is enough; the discount covers the whole cart
        assert_eq!(discount_amount(&coupon, subtotal(&lines)), dec!(22.5));

        let unmatched = vec![line(Uuid::new_v4(), None, dec!(25), 1)];
        assert!(!scope_matches(&unmatched, &coupon));
    }

    #[test]
    fn test_product_scope_matches_offer_ids() {
        let target = Uuid::new_v4();
        let mut coupon = coupon_model(DiscountType::Fixed, dec!(5), None, CouponScope::Product);
        coupon.product_ids = Some(json!([target.to_string()]));

        let mut listed = line(Uuid::new_v4(), None, dec!(40), 2);
        listed.offer_id = target;
        let other = line(Uuid::new_v4(), None, dec!(60), 1);
        assert!(scope_matches(&[listed, other.clone()], &coupon));
        assert!(!scope_matches(&[other], &coupon));

        // The scope list holds offer ids; a line whose owning product id
        // happens to be listed does not match
        let by_product = line(target, None, dec!(60), 1);
        assert!(!scope_matches(&[by_product], &coupon));
    }

    #[test]
    fn test_minor_units_round_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(10)), Some(1000));
        assert_eq!(to_minor_units(dec!(10.005)), Some(1001));
        assert_eq!(to_minor_units(dec!(10.004)), Some(1000));
        assert_eq!(to_minor_units(dec!(0.125)), Some(13));
    }
}
