use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the cart, coupon, payment, and order services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        session_token: String,
        offer_id: Uuid,
    },
    CartItemUpdated {
        session_token: String,
        item_id: Uuid,
    },
    CartItemRemoved {
        session_token: String,
        item_id: Uuid,
    },
    CartCleared {
        session_token: String,
    },

    // Coupon events
    CouponApplied {
        code: String,
        discount_amount: Decimal,
    },
    CouponRedeemed {
        code: String,
    },

    // Payment events
    PaymentIntentCreated {
        amount: Decimal,
        currency: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        payment_intent_id: String,
    },

    // Order events
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// Event delivery is observability, not correctness; callers must not
    /// abort a committed operation because the consumer went away.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!("Dropping event: {}", err);
        }
    }
}

/// Background consumer draining the event channel. Runs until every sender
/// is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "domain event");
    }
    info!("Event channel closed; processor exiting");
}
