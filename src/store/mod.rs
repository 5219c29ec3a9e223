//! Storage abstraction for routing rules, preferences, the product catalog,
//! learned mappings and the cart.
//!
//! The [`Store`] trait is the whole persisted-store contract the pipeline
//! needs: point lookups by normalized key, substring search, ordered and
//! limited queries, upserts for preferences and rules, and append-only cart
//! inserts. Backends:
//!
//! - [`sqlite::SqliteStore`]: the durable backend used by the CLI and server.
//! - [`memory::InMemoryStore`]: `RwLock`-guarded maps for tests and embedding.
//!
//! Implementations must be `Send + Sync` so they can be shared as
//! `Arc<dyn Store>` across async tasks.

#[cfg(test)]
pub(crate) mod failing;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    CartItem, IngredientProductMapping, NewCartItem, NewProduct, Product, RoutingRule,
    ServiceClick, UserDeliveryPreferences,
};

/// Abstract storage backend.
///
/// Ingredient keys passed in are expected to be normalized already
/// (see [`normalize_name`](crate::models::normalize_name)).
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_routing_rule`](Store::get_routing_rule) | Point lookup of an ingredient override |
/// | [`upsert_routing_rule`](Store::upsert_routing_rule) | Insert or replace an override |
/// | [`get_preferences`](Store::get_preferences) | Per-user delivery preferences |
/// | [`save_preferences`](Store::save_preferences) | Upsert preferences by user |
/// | [`insert_product`](Store::insert_product) | Add a catalog record |
/// | [`get_product`](Store::get_product) | Catalog record by id |
/// | [`find_product_by_marketplace_id`](Store::find_product_by_marketplace_id) | Catalog record by ASIN-style id |
/// | [`upsert_mapping`](Store::upsert_mapping) | Learn an ingredient → product association |
/// | [`mapped_products`](Store::mapped_products) | Mapped products by confidence desc |
/// | [`search_products`](Store::search_products) | Substring/keyword catalog search by popularity desc |
/// | [`increment_popularity`](Store::increment_popularity) | Bump a product's popularity counter |
/// | [`insert_cart_item`](Store::insert_cart_item) | Append one cart row |
/// | [`list_cart_items`](Store::list_cart_items) | A user's cart, newest first |
/// | [`record_service_click`](Store::record_service_click) | Append a click-through record |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_routing_rule(&self, ingredient_name: &str) -> Result<Option<RoutingRule>>;

    async fn upsert_routing_rule(&self, rule: &RoutingRule) -> Result<()>;

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserDeliveryPreferences>>;

    async fn save_preferences(&self, prefs: &UserDeliveryPreferences) -> Result<()>;

    /// Insert a product, returning its generated id. Fails on a duplicate
    /// marketplace identifier.
    async fn insert_product(&self, product: &NewProduct) -> Result<String>;

    async fn get_product(&self, id: &str) -> Result<Option<Product>>;

    async fn find_product_by_marketplace_id(&self, marketplace_id: &str)
        -> Result<Option<Product>>;

    /// Insert or update the confidence of an `(ingredient, product)` pair.
    async fn upsert_mapping(&self, mapping: &IngredientProductMapping) -> Result<()>;

    /// Products mapped to an exact ingredient key, highest confidence first.
    async fn mapped_products(&self, ingredient_name: &str, limit: usize) -> Result<Vec<Product>>;

    /// Active products whose name contains `term` or whose keyword set holds
    /// it exactly (case-insensitive), most popular first.
    async fn search_products(
        &self,
        term: &str,
        category_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Product>>;

    async fn increment_popularity(&self, product_id: &str) -> Result<()>;

    async fn insert_cart_item(&self, item: &NewCartItem) -> Result<CartItem>;

    async fn list_cart_items(&self, user_id: &str) -> Result<Vec<CartItem>>;

    async fn record_service_click(&self, click: &ServiceClick) -> Result<()>;
}
