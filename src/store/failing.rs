//! A [`Store`] whose every call fails, for exercising fallback paths.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    CartItem, IngredientProductMapping, NewCartItem, NewProduct, Product, RoutingRule,
    ServiceClick, UserDeliveryPreferences,
};

use super::Store;

pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn get_routing_rule(&self, _: &str) -> Result<Option<RoutingRule>> {
        bail!("store unavailable")
    }

    async fn upsert_routing_rule(&self, _: &RoutingRule) -> Result<()> {
        bail!("store unavailable")
    }

    async fn get_preferences(&self, _: &str) -> Result<Option<UserDeliveryPreferences>> {
        bail!("store unavailable")
    }

    async fn save_preferences(&self, _: &UserDeliveryPreferences) -> Result<()> {
        bail!("store unavailable")
    }

    async fn insert_product(&self, _: &NewProduct) -> Result<String> {
        bail!("store unavailable")
    }

    async fn get_product(&self, _: &str) -> Result<Option<Product>> {
        bail!("store unavailable")
    }

    async fn find_product_by_marketplace_id(&self, _: &str) -> Result<Option<Product>> {
        bail!("store unavailable")
    }

    async fn upsert_mapping(&self, _: &IngredientProductMapping) -> Result<()> {
        bail!("store unavailable")
    }

    async fn mapped_products(&self, _: &str, _: usize) -> Result<Vec<Product>> {
        bail!("store unavailable")
    }

    async fn search_products(&self, _: &str, _: Option<&str>, _: usize) -> Result<Vec<Product>> {
        bail!("store unavailable")
    }

    async fn increment_popularity(&self, _: &str) -> Result<()> {
        bail!("store unavailable")
    }

    async fn insert_cart_item(&self, _: &NewCartItem) -> Result<CartItem> {
        bail!("store unavailable")
    }

    async fn list_cart_items(&self, _: &str) -> Result<Vec<CartItem>> {
        bail!("store unavailable")
    }

    async fn record_service_click(&self, _: &ServiceClick) -> Result<()> {
        bail!("store unavailable")
    }
}
