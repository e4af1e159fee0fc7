use crate::{
    db::DbPool,
    entities::{offer, product, Offer, Product},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-only catalog views backing the storefront listing pages.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub title: String,
    pub price: Decimal,
    pub stock_count: i32,
    pub image_url: Option<String>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Lists purchasable offers: available, with an active product.
    #[instrument(skip(self))]
    pub async fn list_offers(&self) -> Result<Vec<OfferView>, ServiceError> {
        let rows = Offer::find()
            .filter(offer::Column::IsAvailable.eq(true))
            .order_by_asc(offer::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(o, p)| {
                let p = p.filter(|p| p.is_active)?;
                Some(OfferView {
                    id: o.id,
                    product_id: o.product_id,
                    product_name: p.name,
                    title: o.title,
                    price: o.price,
                    stock_count: o.stock_count,
                    image_url: o.image_url,
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_offer(&self, offer_id: Uuid) -> Result<OfferView, ServiceError> {
        let (o, p) = Offer::find_by_id(offer_id)
            .find_also_related(Product)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Offer {} not found", offer_id)))?;

        let product_name = p.map(|p| p.name).unwrap_or_default();
        Ok(OfferView {
            id: o.id,
            product_id: o.product_id,
            product_name,
            title: o.title,
            price: o.price,
            stock_count: o.stock_count,
            image_url: o.image_url,
        })
    }
}
