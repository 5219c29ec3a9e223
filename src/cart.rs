//! Cart repository: append-only per-user cart lines.
//!
//! Bulk adds insert line by line. A failed insert is logged and counted,
//! the rest still go in, and nothing is rolled back.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::models::{CartItem, DeliveryService, NewCartItem, Product, Quantity};
use crate::store::Store;

/// Partial-success outcome of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkInsertReport {
    pub inserted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// One resolved grocery line ready to become a cart row.
#[derive(Debug, Clone)]
pub struct CartEntry<'a> {
    pub ingredient_name: &'a str,
    pub quantity: &'a Quantity,
    pub unit: &'a str,
    pub source_recipe_id: Option<&'a str>,
    pub product: &'a Product,
}

pub struct CartRepository {
    store: Arc<dyn Store>,
}

impl CartRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn add_resolved(
        &self,
        user_id: &str,
        service: DeliveryService,
        entries: &[CartEntry<'_>],
    ) -> BulkInsertReport {
        let mut report = BulkInsertReport::default();
        for entry in entries {
            let row = NewCartItem {
                user_id: user_id.to_string(),
                ingredient_name: entry.ingredient_name.trim().to_string(),
                quantity: entry.quantity.to_string(),
                unit: entry.unit.trim().to_string(),
                product_url: entry.product.product_url.clone(),
                product_name: entry.product.name.clone(),
                price: entry.product.price,
                image_url: entry.product.image_url.clone(),
                marketplace_id: entry.product.marketplace_id.clone(),
                source_recipe_id: entry.source_recipe_id.map(str::to_string),
                delivery_service: Some(service),
            };
            match self.store.insert_cart_item(&row).await {
                Ok(_) => report.inserted += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id,
                        ingredient = %row.ingredient_name,
                        error = %e,
                        "cart insert failed"
                    );
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{}: {}", row.ingredient_name, e));
                }
            }
        }
        report
    }

    /// A user's cart, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<CartItem>> {
        self.store.list_cart_items(user_id).await
    }
}
