use crate::{
    db::DbPool,
    entities::{
        order::{self, OrderItemLine, OrderStatus, PaymentMethod},
        Order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{carts, coupons, pricing},
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

const ORDER_NUMBER_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Order placement and ledger.
///
/// `place_order` is the only write path that turns a cart into an order. It
/// snapshots prices, redeems the coupon, and clears the cart in one database
/// transaction; a failure at any step leaves the cart and the coupon
/// untouched.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

/// How the customer intends to pay at checkout. Card is the default; the
/// order then settles through the payment-intent flow. Bank transfer creates
/// a `pending` order an operator approves manually.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPaymentMethod {
    #[default]
    Card,
    BankTransfer,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrderInput {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    pub customer_contact: Option<String>,
    pub customer_country: Option<String>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub payment_method: CheckoutPaymentMethod,
    /// Card placements may carry an already-confirmed intent id, in which
    /// case the order enters at `processing`. Optimistic only; the webhook
    /// remains the authoritative settlement path.
    pub payment_intent_id: Option<String>,
}

/// Input for an operator-issued payment link: an order created outside the
/// cart flow, paid later by whoever opens the link.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentLinkInput {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    pub customer_contact: Option<String>,
    pub customer_country: Option<String>,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    #[serde(default)]
    pub items: Vec<OrderItemLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<OrderStatus>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Places an order from the session's cart.
    ///
    /// Within one transaction: reads the cart, re-evaluates the coupon,
    /// snapshots the priced lines, inserts the order, atomically redeems the
    /// coupon, and clears the cart. Card orders are `Pending` until payment
    /// is confirmed (or `Processing` when placed with a confirmed intent);
    /// bank-transfer orders stay `Pending` until an operator approves them.
    #[instrument(skip(self, input), fields(customer_email = %input.customer_email))]
    pub async fn place_order(
        &self,
        session_token: &str,
        input: PlaceOrderInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let lines = carts::load_lines(&txn, session_token).await?;
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot place an order with an empty cart".to_string(),
            ));
        }

        let subtotal = pricing::subtotal(&lines);
        let evaluation = match &input.coupon_code {
            Some(code) => Some(coupons::evaluate_on(&txn, code, &lines, Utc::now()).await?),
            None => None,
        };
        let discount_amount = evaluation
            .as_ref()
            .map(|e| e.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total_amount = pricing::total(subtotal, discount_amount);

        let items: Vec<OrderItemLine> = lines
            .iter()
            .map(|l| OrderItemLine {
                id: l.offer_id,
                name: if l.product_name.is_empty() {
                    l.offer_title.clone()
                } else {
                    l.product_name.clone()
                },
                quantity: l.quantity,
                price: l.unit_price,
            })
            .collect();

        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();
        let coupon_code = evaluation.as_ref().map(|e| e.coupon.code.clone());

        let (status, payment_method, payment_intent_id) = match input.payment_method {
            CheckoutPaymentMethod::BankTransfer => {
                (OrderStatus::Pending, PaymentMethod::BankTransfer, None)
            }
            CheckoutPaymentMethod::Card => match input.payment_intent_id {
                Some(intent_id) => (OrderStatus::Processing, PaymentMethod::Stripe, Some(intent_id)),
                None => (OrderStatus::Pending, PaymentMethod::Pending, None),
            },
        };

        let new_order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_name: Set(input.customer_name),
            customer_email: Set(input.customer_email),
            customer_contact: Set(input.customer_contact),
            customer_country: Set(input.customer_country),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_amount),
            coupon_code: Set(coupon_code.clone()),
            total_amount: Set(total_amount),
            status: Set(status),
            payment_method: Set(payment_method),
            payment_token: Set(Uuid::new_v4().to_string()),
            payment_intent_id: Set(payment_intent_id),
            items: Set(serde_json::to_value(&items)
                .map_err(|e| ServiceError::InvalidInput(format!("items snapshot: {}", e)))?),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let placed = new_order.insert(&txn).await?;

        if let Some(evaluation) = &evaluation {
            coupons::redeem_on(&txn, evaluation.coupon.id).await?;
        }

        carts::clear_on(&txn, session_token).await?;

        txn.commit().await?;

        if let Some(code) = coupon_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed { code })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                order_number: order_number.clone(),
            })
            .await;

        info!(%order_number, total = %total_amount, "Order placed");
        Ok(placed)
    }

    /// Creates a pending order to back an operator-issued payment link.
    #[instrument(skip(self, input), fields(customer_email = %input.customer_email))]
    pub async fn create_payment_link_order(
        &self,
        input: CreatePaymentLinkInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;

        let amount = Decimal::try_from(input.amount)
            .map_err(|_| ServiceError::InvalidInput("Invalid amount".to_string()))?;

        let order_id = Uuid::new_v4();
        let order_number = generate_payment_link_order_number();

        let new_order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_name: Set(input.customer_name),
            customer_email: Set(input.customer_email),
            customer_contact: Set(input.customer_contact),
            customer_country: Set(input.customer_country),
            subtotal: Set(amount),
            discount_amount: Set(Decimal::ZERO),
            coupon_code: Set(None),
            total_amount: Set(amount),
            status: Set(OrderStatus::Pending),
            payment_method: Set(PaymentMethod::Pending),
            payment_token: Set(Uuid::new_v4().to_string()),
            payment_intent_id: Set(None),
            items: Set(serde_json::to_value(&input.items)
                .map_err(|e| ServiceError::InvalidInput(format!("items snapshot: {}", e)))?),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let placed = new_order.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                order_number,
            })
            .await;

        Ok(placed)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Looks an order up by its opaque payment token (the payment-link and
    /// payment-page retrieval path).
    #[instrument(skip(self))]
    pub async fn get_by_payment_token(&self, token: &str) -> Result<order::Model, ServiceError> {
        Order::find()
            .filter(order::Column::PaymentToken.eq(token))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Newest-first page of the ledger, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        query: ListOrdersQuery,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

        let mut finder = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = query.status {
            finder = finder.filter(order::Column::Status.eq(status));
        }

        let paginator = finder.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        Ok((orders, total))
    }

    /// Marks an order paid. Idempotent: an order that has already settled is
    /// returned unchanged so webhook retries and the client confirm fallback
    /// cannot double-apply.
    #[instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        payment_token: &str,
        payment_intent_id: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_by_payment_token(payment_token).await?;

        if order.is_paid() {
            info!(order_number = %order.order_number, "Payment already recorded");
            return Ok(order);
        }

        let order_id = order.id;
        let mut active_order: order::ActiveModel = order.into();
        active_order.status = Set(OrderStatus::Processing);
        active_order.payment_method = Set(PaymentMethod::Stripe);
        active_order.payment_intent_id = Set(Some(payment_intent_id.to_string()));
        active_order.updated_at = Set(Utc::now());
        let updated = active_order.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                order_id,
                payment_intent_id: payment_intent_id.to_string(),
            })
            .await;

        info!(order_number = %updated.order_number, "Payment confirmed");
        Ok(updated)
    }

    /// Advances an order through its lifecycle. Invalid transitions fail;
    /// `Completed` and `Cancelled` are terminal.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get_order(order_id).await?;

        if !is_valid_transition(&order.status, &new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot move order from {} to {}",
                order.status.as_str(),
                new_status.as_str()
            )));
        }

        let old_status = order.status.clone();
        let mut active_order: order::ActiveModel = order.into();
        active_order.status = Set(new_status.clone());
        active_order.updated_at = Set(Utc::now());
        let updated = active_order.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        Ok(updated)
    }
}

/// Allowed lifecycle moves. Payment settles Pending into Processing through
/// `confirm_payment`; operators drive the rest.
pub(crate) fn is_valid_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Cancelled)
            | (Processing, Completed)
            | (Processing, Cancelled)
    )
}

/// Storefront order numbers: millisecond timestamp plus six random
/// uppercase alphanumerics. Advisory, not a uniqueness guarantee; the
/// primary key is the UUID.
fn generate_order_number() -> String {
    format!("{}{}", Utc::now().timestamp_millis(), random_suffix(6))
}

/// Payment-link order numbers carry an ORD- prefix so operators can tell
/// them apart in the ledger.
fn generate_payment_link_order_number() -> String {
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), random_suffix(9))
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_NUMBER_CHARSET.len());
            ORDER_NUMBER_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_matrix() {
        use OrderStatus::*;
        assert!(is_valid_transition(&Pending, &Processing));
        assert!(is_valid_transition(&Pending, &Cancelled));
        assert!(is_valid_transition(&Processing, &Completed));
        assert!(is_valid_transition(&Processing, &Cancelled));

        assert!(!is_valid_transition(&Pending, &Completed));
        assert!(!is_valid_transition(&Completed, &Cancelled));
        assert!(!is_valid_transition(&Cancelled, &Processing));
        assert!(!is_valid_transition(&Pending, &Pending));
    }

    #[test]
    fn test_order_number_shape() {
        let n = generate_order_number();
        assert!(n.len() >= 19);
        assert!(n.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let p = generate_payment_link_order_number();
        assert!(p.starts_with("ORD-"));
    }
}
