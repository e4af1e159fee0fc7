use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle. `Pending` orders await payment; the webhook (or the
/// client confirm fallback) moves them to `Processing`.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// No payment captured yet
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "stripe")]
    Stripe,
    /// Manual bank transfer, approved by an operator
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
}

/// One line of the immutable items snapshot stored on the order. Captured
/// at placement time; later catalog edits never change it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItemLine {
    pub id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    #[sea_orm(nullable)]
    pub customer_contact: Option<String>,
    #[sea_orm(nullable)]
    pub customer_country: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// Opaque token for payment-link retrieval; unique per order
    #[sea_orm(unique)]
    pub payment_token: String,
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,
    /// Snapshot of the purchased lines as a JSON array of [`OrderItemLine`]
    pub items: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Deserializes the items snapshot
    pub fn item_lines(&self) -> Result<Vec<OrderItemLine>, serde_json::Error> {
        serde_json::from_value(self.items.clone())
    }

    /// True once payment has been captured or a collection method has been
    /// committed (a bank-transfer order counts even while it awaits manual
    /// approval); used by the payment-link flow to refuse double charges.
    pub fn is_paid(&self) -> bool {
        self.status != OrderStatus::Pending || self.payment_method != PaymentMethod::Pending
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
