use crate::{
    db::DbPool,
    entities::{coupon, Coupon},
    errors::{CouponError, ServiceError},
    events::{Event, EventSender},
    services::{carts, pricing, pricing::CartLine, pricing::Quote},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Coupon evaluation and redemption.
///
/// Evaluation is a dry run: it never mutates `usage_count`, so a client can
/// re-apply the same code any number of times before checkout. Redemption is
/// a single conditional UPDATE executed inside the order transaction, so two
/// concurrent checkouts cannot both consume the last use of a limited code.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

/// A coupon that passed every evaluation check, with its computed discount.
#[derive(Debug, Clone)]
pub struct CouponEvaluation {
    pub coupon: coupon::Model,
    pub discount_amount: Decimal,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Evaluates a code against the session's cart and returns the quote the
    /// client would pay. Dry run only.
    #[instrument(skip(self))]
    pub async fn apply(&self, session_token: &str, code: &str) -> Result<Quote, ServiceError> {
        let lines = carts::load_lines(&*self.db, session_token).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot apply a coupon to an empty cart".to_string(),
            ));
        }

        let evaluation = evaluate_on(&*self.db, code, &lines, Utc::now()).await?;
        let subtotal = pricing::subtotal(&lines);
        let quote = Quote {
            subtotal,
            discount_amount: evaluation.discount_amount,
            total: pricing::total(subtotal, evaluation.discount_amount),
            coupon_code: Some(evaluation.coupon.code.clone()),
        };

        self.event_sender
            .send_or_log(Event::CouponApplied {
                code: evaluation.coupon.code,
                discount_amount: evaluation.discount_amount,
            })
            .await;

        info!(discount = %quote.discount_amount, "Coupon applied");
        Ok(quote)
    }
}

/// Runs the rejection ladder in order and computes the discount for a code
/// that survives it. Checks run against `now` so tests can pin the clock.
pub(crate) async fn evaluate_on<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    lines: &[CartLine],
    now: DateTime<Utc>,
) -> Result<CouponEvaluation, ServiceError> {
    let normalized = code.trim().to_uppercase();

    let coupon = Coupon::find()
        .filter(coupon::Column::Code.eq(normalized))
        .filter(coupon::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or(CouponError::NotFound)?;

    if now < coupon.valid_from {
        return Err(CouponError::NotYetActive.into());
    }
    if now > coupon.valid_until {
        return Err(CouponError::Expired.into());
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(CouponError::LimitReached.into());
        }
    }

    let subtotal = pricing::subtotal(lines);
    if let Some(minimum) = coupon.min_purchase_amount {
        if subtotal < minimum {
            return Err(CouponError::BelowMinimum { minimum }.into());
        }
    }

    // Scope is a pass/fail gate; a coupon that passes discounts the full
    // subtotal, not just the matching lines.
    if !pricing::scope_matches(lines, &coupon) {
        return Err(CouponError::NotApplicable.into());
    }

    let discount_amount = pricing::discount_amount(&coupon, subtotal);
    Ok(CouponEvaluation {
        coupon,
        discount_amount,
    })
}

/// Consumes one use of the coupon. The increment and the limit check are one
/// conditional UPDATE; zero affected rows means a concurrent checkout took
/// the last use after this transaction evaluated the code.
pub(crate) async fn redeem_on<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Uuid,
) -> Result<(), ServiceError> {
    let result = Coupon::update_many()
        .col_expr(
            coupon::Column::UsageCount,
            Expr::col(coupon::Column::UsageCount).add(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupon::Column::Id.eq(coupon_id))
        .filter(
            Condition::any()
                .add(coupon::Column::UsageLimit.is_null())
                .add(
                    Expr::col(coupon::Column::UsageCount)
                        .lt(Expr::col(coupon::Column::UsageLimit)),
                ),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(CouponError::LimitReached.into());
    }
    Ok(())
}
