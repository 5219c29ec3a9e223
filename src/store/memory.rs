//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Search semantics
//! mirror the SQLite backend: case-insensitive name substring or exact
//! keyword, active products only, popularity then name ordering.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    CartItem, IngredientProductMapping, NewCartItem, NewProduct, Product, RoutingRule,
    ServiceClick, UserDeliveryPreferences,
};

use super::Store;

/// In-memory store.
pub struct InMemoryStore {
    rules: RwLock<HashMap<String, RoutingRule>>,
    preferences: RwLock<HashMap<String, UserDeliveryPreferences>>,
    products: RwLock<Vec<Product>>,
    mappings: RwLock<Vec<IngredientProductMapping>>,
    cart: RwLock<Vec<CartItem>>,
    clicks: RwLock<Vec<ServiceClick>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            preferences: RwLock::new(HashMap::new()),
            products: RwLock::new(Vec::new()),
            mappings: RwLock::new(Vec::new()),
            cart: RwLock::new(Vec::new()),
            clicks: RwLock::new(Vec::new()),
        }
    }

    /// Click-through records, oldest first.
    pub fn service_clicks(&self) -> Vec<ServiceClick> {
        self.clicks
            .read()
            .map(|clicks| clicks.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn matches_term(product: &Product, term: &str) -> bool {
    product.name.to_lowercase().contains(term)
        || product
            .search_keywords
            .iter()
            .any(|k| k.to_lowercase() == term)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_routing_rule(&self, ingredient_name: &str) -> Result<Option<RoutingRule>> {
        Ok(read(&self.rules)?.get(ingredient_name).cloned())
    }

    async fn upsert_routing_rule(&self, rule: &RoutingRule) -> Result<()> {
        write(&self.rules)?.insert(rule.ingredient_name.clone(), rule.clone());
        Ok(())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserDeliveryPreferences>> {
        Ok(read(&self.preferences)?.get(user_id).cloned())
    }

    async fn save_preferences(&self, prefs: &UserDeliveryPreferences) -> Result<()> {
        write(&self.preferences)?.insert(prefs.user_id.clone(), prefs.clone());
        Ok(())
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<String> {
        let mut products = write(&self.products)?;
        if let Some(mid) = &product.marketplace_id {
            if products
                .iter()
                .any(|p| p.marketplace_id.as_deref() == Some(mid.as_str()))
            {
                bail!("duplicate marketplace identifier: {}", mid);
            }
        }
        let id = Uuid::new_v4().to_string();
        products.push(Product {
            id: id.clone(),
            category_id: product.category_id.clone(),
            name: product.name.clone(),
            marketplace_id: product.marketplace_id.clone(),
            product_url: product.product_url.clone(),
            price: product.price,
            image_url: product.image_url.clone(),
            brand: product.brand.clone(),
            package_size: product.package_size.clone(),
            is_prime: product.is_prime,
            search_keywords: product.search_keywords.clone(),
            popularity_score: 0,
            is_active: true,
        });
        Ok(id)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        Ok(read(&self.products)?.iter().find(|p| p.id == id).cloned())
    }

    async fn find_product_by_marketplace_id(
        &self,
        marketplace_id: &str,
    ) -> Result<Option<Product>> {
        Ok(read(&self.products)?
            .iter()
            .find(|p| p.marketplace_id.as_deref() == Some(marketplace_id))
            .cloned())
    }

    async fn upsert_mapping(&self, mapping: &IngredientProductMapping) -> Result<()> {
        let mut mappings = write(&self.mappings)?;
        match mappings.iter_mut().find(|m| {
            m.ingredient_name == mapping.ingredient_name && m.product_id == mapping.product_id
        }) {
            Some(existing) => existing.confidence_score = mapping.confidence_score,
            None => mappings.push(mapping.clone()),
        }
        Ok(())
    }

    async fn mapped_products(&self, ingredient_name: &str, limit: usize) -> Result<Vec<Product>> {
        let mut hits: Vec<IngredientProductMapping> = read(&self.mappings)?
            .iter()
            .filter(|m| m.ingredient_name == ingredient_name)
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.product_id.cmp(&b.product_id))
        });
        hits.truncate(limit);

        let products = read(&self.products)?;
        Ok(hits
            .iter()
            .filter_map(|m| products.iter().find(|p| p.id == m.product_id).cloned())
            .collect())
    }

    async fn search_products(
        &self,
        term: &str,
        category_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let term = term.trim().to_lowercase();
        let mut hits: Vec<Product> = read(&self.products)?
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| category_id.map_or(true, |c| p.category_id == c))
            .filter(|p| term.is_empty() || matches_term(p, &term))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.popularity_score
                .cmp(&a.popularity_score)
                .then(a.name.cmp(&b.name))
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn increment_popularity(&self, product_id: &str) -> Result<()> {
        let mut products = write(&self.products)?;
        let product = products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| anyhow!("product not found: {}", product_id))?;
        product.popularity_score += 1;
        Ok(())
    }

    async fn insert_cart_item(&self, item: &NewCartItem) -> Result<CartItem> {
        let row = CartItem {
            id: Uuid::new_v4().to_string(),
            user_id: item.user_id.clone(),
            ingredient_name: item.ingredient_name.clone(),
            quantity: item.quantity.clone(),
            unit: item.unit.clone(),
            product_url: item.product_url.clone(),
            product_name: item.product_name.clone(),
            price: item.price,
            image_url: item.image_url.clone(),
            marketplace_id: item.marketplace_id.clone(),
            source_recipe_id: item.source_recipe_id.clone(),
            delivery_service: item.delivery_service,
            created_at: chrono::Utc::now().timestamp(),
        };
        write(&self.cart)?.push(row.clone());
        Ok(row)
    }

    async fn list_cart_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        Ok(read(&self.cart)?
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn record_service_click(&self, click: &ServiceClick) -> Result<()> {
        write(&self.clicks)?.push(click.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product(name: &str, mid: &str, keywords: &[&str]) -> NewProduct {
        NewProduct {
            category_id: "baking".to_string(),
            name: name.to_string(),
            marketplace_id: Some(mid.to_string()),
            product_url: format!("https://www.amazon.com/dp/{}", mid),
            price: Some(4.99),
            image_url: None,
            brand: None,
            package_size: None,
            is_prime: true,
            search_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_marketplace_id_rejected() {
        let store = InMemoryStore::new();
        store
            .insert_product(&new_product("Flour", "B001E5E3KG", &[]))
            .await
            .unwrap();
        assert!(store
            .insert_product(&new_product("Other flour", "B001E5E3KG", &[]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_search_by_name_and_keyword() {
        let store = InMemoryStore::new();
        store
            .insert_product(&new_product("Gold Medal All-Purpose Flour", "B001E5E3KG", &["baking"]))
            .await
            .unwrap();
        store
            .insert_product(&new_product("Cane Sugar", "B00I8G8AKO", &["sweetener"]))
            .await
            .unwrap();

        let by_name = store.search_products("flour", None, 5).await.unwrap();
        assert_eq!(by_name.len(), 1);
        let by_keyword = store.search_products("Sweetener", None, 5).await.unwrap();
        assert_eq!(by_keyword[0].name, "Cane Sugar");
        let none = store.search_products("sweet", None, 5).await.unwrap();
        assert!(none.is_empty(), "keywords match exactly, not by substring");
    }

    #[tokio::test]
    async fn test_search_orders_by_popularity() {
        let store = InMemoryStore::new();
        let a = store
            .insert_product(&new_product("Rice A", "B000000001", &[]))
            .await
            .unwrap();
        let b = store
            .insert_product(&new_product("Rice B", "B000000002", &[]))
            .await
            .unwrap();
        store.increment_popularity(&b).await.unwrap();

        let hits = store.search_products("rice", None, 5).await.unwrap();
        assert_eq!(hits[0].id, b);
        assert_eq!(hits[1].id, a);

        let limited = store.search_products("rice", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_mapping_upsert_and_order() {
        let store = InMemoryStore::new();
        let a = store
            .insert_product(&new_product("Flour A", "B000000001", &[]))
            .await
            .unwrap();
        let b = store
            .insert_product(&new_product("Flour B", "B000000002", &[]))
            .await
            .unwrap();
        for (pid, conf) in [(&a, 0.4), (&b, 0.8), (&a, 0.9)] {
            store
                .upsert_mapping(&IngredientProductMapping {
                    ingredient_name: "flour".to_string(),
                    product_id: pid.clone(),
                    confidence_score: conf,
                })
                .await
                .unwrap();
        }
        let hits = store.mapped_products("flour", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, a);
        assert_eq!(hits[1].id, b);
    }

    #[tokio::test]
    async fn test_increment_missing_product_fails() {
        let store = InMemoryStore::new();
        assert!(store.increment_popularity("nope").await.is_err());
    }
}
