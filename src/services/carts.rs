use crate::{
    db::DbPool,
    entities::{cart_item, product, CartItem, Offer, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::CartLine,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Session cart service.
///
/// Carts are keyed by an opaque session token the client mints and carries;
/// there is no cart row, only lines. A line is unique per
/// (session_token, offer_id) and re-adding an offer increments its quantity.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub offer_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateQuantityInput {
    #[validate(range(min = 0, max = 999))]
    pub quantity: i32,
}

/// Cart contents plus the running subtotal, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: rust_decimal::Decimal,
    pub item_count: i32,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the cart's lines with current offer pricing, oldest first.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, session_token: &str) -> Result<CartView, ServiceError> {
        let lines = load_lines(&*self.db, session_token).await?;
        Ok(view_of(lines))
    }

    /// Adds an offer to the cart, incrementing the quantity when the offer
    /// is already present. Rejects offers that are unavailable or whose
    /// product is inactive.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        session_token: &str,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let (offer, prod) = Offer::find_by_id(input.offer_id)
            .find_also_related(Product)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Offer {} not found", input.offer_id)))?;

        let active = prod.map(|p| p.is_active).unwrap_or(false);
        if !offer.is_available || !active {
            return Err(ServiceError::InvalidOperation(
                "This item is currently unavailable".to_string(),
            ));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::SessionToken.eq(session_token))
            .filter(cart_item::Column::OfferId.eq(input.offer_id))
            .one(&txn)
            .await?;

        match existing {
            Some(line) => {
                let quantity = line.quantity + input.quantity;
                let mut active_line: cart_item::ActiveModel = line.into();
                active_line.quantity = Set(quantity);
                active_line.updated_at = Set(Utc::now());
                active_line.update(&txn).await?;
            }
            None => {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    session_token: Set(session_token.to_string()),
                    offer_id: Set(input.offer_id),
                    quantity: Set(input.quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                line.insert(&txn).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                session_token: session_token.to_string(),
                offer_id: input.offer_id,
            })
            .await;

        self.get_cart(session_token).await
    }

    /// Sets a line's quantity. A quantity of zero removes the line.
    /// The line must belong to the caller's session.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        session_token: &str,
        item_id: Uuid,
        input: UpdateQuantityInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        if input.quantity == 0 {
            return self.remove_item(session_token, item_id).await;
        }

        let line = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::SessionToken.eq(session_token))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let mut active_line: cart_item::ActiveModel = line.into();
        active_line.quantity = Set(input.quantity);
        active_line.updated_at = Set(Utc::now());
        active_line.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                session_token: session_token.to_string(),
                item_id,
            })
            .await;

        self.get_cart(session_token).await
    }

    /// Removes a single line from the caller's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        session_token: &str,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::SessionToken.eq(session_token))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                session_token: session_token.to_string(),
                item_id,
            })
            .await;

        self.get_cart(session_token).await
    }

    /// Empties the caller's cart. Other sessions are untouched.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, session_token: &str) -> Result<(), ServiceError> {
        clear_on(&*self.db, session_token).await?;

        self.event_sender
            .send_or_log(Event::CartCleared {
                session_token: session_token.to_string(),
            })
            .await;

        info!("Cleared cart for session");
        Ok(())
    }
}

/// Builds the client-facing view from loaded lines.
pub fn view_of(items: Vec<CartLine>) -> CartView {
    let subtotal = super::pricing::subtotal(&items);
    let item_count = items.iter().map(|l| l.quantity).sum();
    CartView {
        items,
        subtotal,
        item_count,
    }
}

/// Loads a session's lines joined with offer and product data. Generic over
/// the connection so order placement can read inside its transaction.
pub(crate) async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    session_token: &str,
) -> Result<Vec<CartLine>, ServiceError> {
    let rows = CartItem::find()
        .filter(cart_item::Column::SessionToken.eq(session_token))
        .order_by_asc(cart_item::Column::CreatedAt)
        .find_also_related(Offer)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = rows
        .iter()
        .filter_map(|(_, o)| o.as_ref().map(|o| o.product_id))
        .collect();

    let products: HashMap<Uuid, product::Model> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut lines = Vec::with_capacity(rows.len());
    for (item, maybe_offer) in rows {
        // A line whose offer was deleted out from under it is dropped from
        // the view rather than failing the whole cart.
        let Some(offer_row) = maybe_offer else {
            continue;
        };
        let prod = products.get(&offer_row.product_id);
        lines.push(CartLine {
            item_id: item.id,
            offer_id: offer_row.id,
            product_id: offer_row.product_id,
            category_id: prod.and_then(|p| p.category_id),
            product_name: prod.map(|p| p.name.clone()).unwrap_or_default(),
            offer_title: offer_row.title,
            unit_price: offer_row.price,
            quantity: item.quantity,
            image_url: offer_row.image_url,
        });
    }
    Ok(lines)
}

/// Deletes every line for the session on the given connection.
pub(crate) async fn clear_on<C: ConnectionTrait>(
    conn: &C,
    session_token: &str,
) -> Result<u64, ServiceError> {
    let result = CartItem::delete_many()
        .filter(cart_item::Column::SessionToken.eq(session_token))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
