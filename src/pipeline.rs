//! End-to-end checkout orchestration.
//!
//! ```text
//! GroceryItem[] ─► Router ─► quick_delivery ─► ShoppingListClient ─► link
//!                          ├► marketplace ────► ProductMatcher ─► Cart ─► Aggregator
//!                          └► manual ─────────────────────────────────► Aggregator
//! ```
//!
//! Only an empty grocery list is rejected. Every other failure degrades:
//! a store read falls back to defaults or the classifier, a failed lookup
//! leaves the item for manual search, a failed cart insert is counted, and
//! the shopping-list call falls back to a storefront link.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::affiliate::LinkBuilder;
use crate::best_effort::BestEffort;
use crate::cart::{BulkInsertReport, CartEntry, CartRepository};
use crate::checkout::CheckoutAggregator;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::PipelineError;
use crate::matcher::ProductMatcher;
use crate::models::{
    CheckoutResult, DeliveryService, GroceryItem, Product, ResolvedLine, RoutedItem, RoutingPlan,
    ServiceClick, UserDeliveryPreferences,
};
use crate::quick_delivery::{ShoppingLink, ShoppingListClient};
use crate::routing::Router;
use crate::store::Store;

/// Marketplace group outcome: the checkout plan plus what reached the cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketplaceCheckout {
    #[serde(flatten)]
    pub result: CheckoutResult,
    pub cart: BulkInsertReport,
}

/// Result of a full checkout. Each group is present only when it has items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub plan: RoutingPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_delivery: Option<ShoppingLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<MarketplaceCheckout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<CheckoutResult>,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    router: Router,
    matcher: ProductMatcher,
    aggregator: CheckoutAggregator,
    cart: CartRepository,
    shopping: ShoppingListClient,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let shopping = ShoppingListClient::from_config(config)?;
        Ok(Self::with_shopping_client(config, store, shopping))
    }

    pub fn with_shopping_client(
        config: &Config,
        store: Arc<dyn Store>,
        shopping: ShoppingListClient,
    ) -> Self {
        let links = LinkBuilder::from_config(config);
        Self {
            router: Router::new(store.clone(), Classifier::new(config.classifier.clone())),
            matcher: ProductMatcher::new(store.clone()),
            aggregator: CheckoutAggregator::new(links),
            cart: CartRepository::new(store.clone()),
            shopping,
            concurrency: config.matcher.concurrency.max(1),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn links(&self) -> &LinkBuilder {
        self.aggregator.links()
    }

    pub fn matcher(&self) -> &ProductMatcher {
        &self.matcher
    }

    pub fn cart(&self) -> &CartRepository {
        &self.cart
    }

    /// Stored preferences, or the defaults when absent or unreadable.
    pub async fn preferences(&self, user_id: &str) -> UserDeliveryPreferences {
        match self.store.get_preferences(user_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => UserDeliveryPreferences::defaults_for(user_id),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "preferences lookup failed; using defaults");
                UserDeliveryPreferences::defaults_for(user_id)
            }
        }
    }

    /// Route a grocery list using the user's preferences.
    pub async fn plan(
        &self,
        user_id: &str,
        items: &[GroceryItem],
    ) -> Result<RoutingPlan, PipelineError> {
        if items.is_empty() {
            return Err(PipelineError::EmptyGroceryList);
        }
        let prefs = self.preferences(user_id).await;
        Ok(self.router.route(items, Some(&prefs)).await)
    }

    /// Top product per item, in input order. Lookups run concurrently up to
    /// the configured limit; a failed lookup leaves the item unresolved.
    pub async fn resolve(&self, items: &[GroceryItem]) -> Vec<Option<Product>> {
        // Borrowed names would make the checkout future !Send
        let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let matcher = &self.matcher;
        let results: Vec<Result<Vec<Product>>> = stream::iter(names)
            .map(|name| async move { matcher.find_products(&name, 1).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .zip(items)
            .map(|(result, item)| match result {
                Ok(products) => products.into_iter().next(),
                Err(e) => {
                    tracing::warn!(ingredient = %item.name, error = %e, "product lookup failed");
                    None
                }
            })
            .collect()
    }

    /// Resolve, add to cart and aggregate one destination group.
    pub async fn checkout_group(
        &self,
        user_id: &str,
        service: DeliveryService,
        items: &[GroceryItem],
    ) -> MarketplaceCheckout {
        let resolved = self.resolve(items).await;

        // A product without a marketplace id cannot go in a cart-add link
        let matched: Vec<Option<&Product>> = resolved
            .iter()
            .map(|p| p.as_ref().filter(|p| p.marketplace_id.is_some()))
            .collect();

        let entries: Vec<CartEntry<'_>> = items
            .iter()
            .zip(&matched)
            .filter_map(|(item, product)| {
                product.map(|product| CartEntry {
                    ingredient_name: &item.name,
                    quantity: &item.quantity,
                    unit: &item.unit,
                    source_recipe_id: item.source_recipe_id.as_deref(),
                    product,
                })
            })
            .collect();
        let cart = self.cart.add_resolved(user_id, service, &entries).await;

        for product in matched.iter().flatten() {
            self.matcher.record_selection(&product.id).await;
        }
        self.record_click(user_id, service, items.len()).await;

        let lines: Vec<ResolvedLine> = items
            .iter()
            .zip(&matched)
            .map(|(item, product)| ResolvedLine {
                name: item.name.clone(),
                quantity: item.quantity.clone(),
                unit: item.unit.clone(),
                product_ref: product.and_then(|p| p.marketplace_id.clone()),
            })
            .collect();

        MarketplaceCheckout {
            result: self.aggregator.build_checkout(&lines, service),
            cart,
        }
    }

    /// Route the list and produce an outcome for every non-empty group.
    pub async fn checkout(
        &self,
        user_id: &str,
        items: &[GroceryItem],
    ) -> Result<CheckoutSummary, PipelineError> {
        let plan = self.plan(user_id, items).await?;

        let quick_delivery = if plan.quick_delivery_items.is_empty() {
            None
        } else {
            let group = grocery_items(&plan.quick_delivery_items);
            let link = self
                .shopping
                .shopping_list_link(&group, user_id, self.links())
                .await;
            self.record_click(user_id, DeliveryService::QuickDelivery, group.len())
                .await;
            Some(link)
        };

        let marketplace = if plan.marketplace_items.is_empty() {
            None
        } else {
            let group = grocery_items(&plan.marketplace_items);
            Some(
                self.checkout_group(user_id, DeliveryService::Marketplace, &group)
                    .await,
            )
        };

        let manual = if plan.manual_items.is_empty() {
            None
        } else {
            let lines: Vec<ResolvedLine> = plan
                .manual_items
                .iter()
                .map(|routed| ResolvedLine {
                    name: routed.item.name.clone(),
                    quantity: routed.item.quantity.clone(),
                    unit: routed.item.unit.clone(),
                    product_ref: None,
                })
                .collect();
            Some(self.aggregator.build_checkout(&lines, DeliveryService::Manual))
        };

        tracing::info!(
            user_id,
            quick_delivery = plan.quick_delivery_items.len(),
            marketplace = plan.marketplace_items.len(),
            manual = plan.manual_items.len(),
            "checkout planned"
        );

        Ok(CheckoutSummary {
            plan,
            quick_delivery,
            marketplace,
            manual,
        })
    }

    async fn record_click(&self, user_id: &str, service: DeliveryService, item_count: usize) -> BestEffort {
        let click = ServiceClick {
            user_id: user_id.to_string(),
            service,
            item_count,
        };
        BestEffort::run("record_service_click", self.store.record_service_click(&click)).await
    }
}

fn grocery_items(routed: &[RoutedItem]) -> Vec<GroceryItem> {
    routed.iter().map(|r| r.item.clone()).collect()
}
