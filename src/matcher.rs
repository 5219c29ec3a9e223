//! Product matcher: resolves an ingredient name to ranked catalog products.
//!
//! Learned mappings for the exact normalized name win outright. Without
//! one, the text before the first comma (`"tomato, diced"` → `"tomato"`)
//! is searched against product names and keywords, most popular first.
//! An empty result means "needs manual search", not failure.

use std::sync::Arc;

use anyhow::Result;

use crate::best_effort::BestEffort;
use crate::error::PipelineError;
use crate::models::{normalize_name, IngredientProductMapping, Product};
use crate::store::Store;

pub struct ProductMatcher {
    store: Arc<dyn Store>,
}

impl ProductMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Best-first candidates for `ingredient`, at most `limit` of them.
    ///
    /// A failed mapping lookup falls through to catalog search; a failed
    /// catalog search is returned to the caller.
    pub async fn find_products(&self, ingredient: &str, limit: usize) -> Result<Vec<Product>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = normalize_name(ingredient);
        if key.is_empty() {
            return Ok(Vec::new());
        }

        match self.store.mapped_products(&key, limit).await {
            Ok(mapped) if !mapped.is_empty() => return Ok(mapped),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(ingredient = %key, error = %e, "mapping lookup failed; searching catalog");
            }
        }

        let term = search_term(&key);
        if term.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_products(term, None, limit).await
    }

    /// Count a product as chosen. Never fails the caller.
    pub async fn record_selection(&self, product_id: &str) -> BestEffort {
        BestEffort::run("increment_popularity", self.store.increment_popularity(product_id)).await
    }

    /// Learn (or re-weight) an ingredient → product association.
    pub async fn add_mapping(
        &self,
        ingredient: &str,
        product_id: &str,
        confidence_score: f64,
    ) -> Result<()> {
        let key = normalize_name(ingredient);
        if key.is_empty() {
            return Err(PipelineError::InvalidMapping("ingredient name must not be empty".into()).into());
        }
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(PipelineError::InvalidMapping(format!(
                "confidence score must be in [0, 1], got {}",
                confidence_score
            ))
            .into());
        }
        if self.store.get_product(product_id).await?.is_none() {
            return Err(PipelineError::InvalidMapping(format!("unknown product: {}", product_id)).into());
        }
        self.store
            .upsert_mapping(&IngredientProductMapping {
                ingredient_name: key,
                product_id: product_id.to_string(),
                confidence_score,
            })
            .await
    }
}

/// Search text for a normalized name: everything before the first comma.
fn search_term(normalized: &str) -> &str {
    normalized.split(',').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProduct;
    use crate::store::failing::FailingStore;
    use crate::store::memory::InMemoryStore;

    fn product(name: &str, mid: &str, keywords: &[&str]) -> NewProduct {
        NewProduct {
            category_id: "produce".to_string(),
            name: name.to_string(),
            marketplace_id: Some(mid.to_string()),
            product_url: format!("https://www.amazon.com/dp/{}", mid),
            price: None,
            image_url: None,
            brand: None,
            package_size: None,
            is_prime: false,
            search_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    async fn seeded() -> (Arc<InMemoryStore>, String, String) {
        let store = Arc::new(InMemoryStore::new());
        let roma = store
            .insert_product(&product("Roma Tomatoes 2lb", "B000000001", &["tomato"]))
            .await
            .unwrap();
        let paste = store
            .insert_product(&product("Tomato Paste", "B000000002", &[]))
            .await
            .unwrap();
        (store, roma, paste)
    }

    #[test]
    fn test_search_term() {
        assert_eq!(search_term("tomato, diced"), "tomato");
        assert_eq!(search_term("tomato"), "tomato");
        assert_eq!(search_term(", diced"), "");
    }

    #[tokio::test]
    async fn test_mapping_short_circuits_search() {
        let (store, roma, paste) = seeded().await;
        let matcher = ProductMatcher::new(store.clone());
        matcher.add_mapping("Tomato", &paste, 0.9).await.unwrap();

        let hits = matcher.find_products("  TOMATO ", 5).await.unwrap();
        assert_eq!(hits.len(), 1, "no search when a mapping exists");
        assert_eq!(hits[0].id, paste);
        assert_ne!(hits[0].id, roma);
    }

    #[tokio::test]
    async fn test_search_uses_text_before_comma() {
        let (store, _, _) = seeded().await;
        let matcher = ProductMatcher::new(store);
        let hits = matcher.find_products("Tomato, diced", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let (store, _, _) = seeded().await;
        let matcher = ProductMatcher::new(store);
        assert_eq!(matcher.find_products("tomato", 1).await.unwrap().len(), 1);
        assert!(matcher.find_products("tomato", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let (store, _, _) = seeded().await;
        let matcher = ProductMatcher::new(store);
        assert!(matcher
            .find_products("unobtainium powder", 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_record_selection_bumps_popularity() {
        let (store, roma, _) = seeded().await;
        let matcher = ProductMatcher::new(store.clone());
        assert!(matcher.record_selection(&roma).await.is_applied());
        let product = store.get_product(&roma).await.unwrap().unwrap();
        assert_eq!(product.popularity_score, 1);

        assert!(!matcher.record_selection("missing").await.is_applied());
    }

    #[tokio::test]
    async fn test_add_mapping_validates() {
        let (store, roma, _) = seeded().await;
        let matcher = ProductMatcher::new(store);
        assert!(matcher.add_mapping("tomato", &roma, 1.5).await.is_err());
        assert!(matcher.add_mapping("  ", &roma, 0.5).await.is_err());
        let err = matcher.add_mapping("tomato", "nope", 0.5).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidMapping(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_from_search() {
        let matcher = ProductMatcher::new(Arc::new(FailingStore));
        assert!(matcher.find_products("tomato", 5).await.is_err());
    }
}
