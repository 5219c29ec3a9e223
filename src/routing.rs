//! Routing resolver: decides the fulfillment service for each grocery item.
//!
//! Per item, in order:
//!
//! 1. A persisted [`RoutingRule`](crate::models::RoutingRule) for the
//!    normalized name, if any, is the base recommendation.
//! 2. Otherwise the keyword [`Classifier`] supplies it.
//! 3. An explicit default service in the user's preferences replaces the
//!    recommended service, even after a rule match.
//! 4. Freshness ≥ 8 with fresh auto-routing disabled forces `manual`.
//! 5. Freshness ≤ 3 with pantry auto-routing disabled forces `manual`.
//!
//! Opt-outs run after the default-service override, so they can downgrade
//! an explicit choice. A failed rule lookup is logged and the classifier
//! result is used instead.

use std::sync::Arc;

use crate::classifier::Classifier;
use crate::models::{
    normalize_name, Category, DeliveryService, GroceryItem, RoutedItem, RoutingPlan,
    ServicePreference, UserDeliveryPreferences,
};
use crate::store::Store;

pub const RULE_MATCH: &str = "rule match";
pub const AUTO_CATEGORIZED: &str = "auto-categorized";

const RULE_CONFIDENCE: f64 = 1.0;
const AUTO_CONFIDENCE: f64 = 0.7;

const FRESH_THRESHOLD: u8 = 8;
const PANTRY_THRESHOLD: u8 = 3;

pub struct Router {
    store: Arc<dyn Store>,
    classifier: Classifier,
}

struct Base {
    category: Category,
    service: DeliveryService,
    freshness_priority: u8,
    confidence_score: f64,
    reasoning: &'static str,
}

impl Router {
    pub fn new(store: Arc<dyn Store>, classifier: Classifier) -> Self {
        Self { store, classifier }
    }

    /// Route every item and group by final service, keeping input order
    /// within each group. `None` preferences behave as the defaults.
    pub async fn route(
        &self,
        items: &[GroceryItem],
        prefs: Option<&UserDeliveryPreferences>,
    ) -> RoutingPlan {
        let defaults;
        let prefs = match prefs {
            Some(p) => p,
            None => {
                defaults = UserDeliveryPreferences::defaults_for("");
                &defaults
            }
        };

        let mut plan = RoutingPlan::default();
        for item in items {
            let routed = self.route_item(item, prefs).await;
            match routed.recommended_service {
                DeliveryService::QuickDelivery => plan.quick_delivery_items.push(routed),
                DeliveryService::Marketplace => plan.marketplace_items.push(routed),
                DeliveryService::Manual => plan.manual_items.push(routed),
            }
        }
        plan
    }

    pub async fn route_item(
        &self,
        item: &GroceryItem,
        prefs: &UserDeliveryPreferences,
    ) -> RoutedItem {
        let base = self.base_recommendation(&item.name).await;
        let service = apply_preferences(base.service, base.freshness_priority, prefs);

        RoutedItem {
            item: item.clone(),
            category: base.category,
            recommended_service: service,
            freshness_priority: base.freshness_priority,
            confidence_score: base.confidence_score,
            reasoning: base.reasoning.to_string(),
        }
    }

    async fn base_recommendation(&self, name: &str) -> Base {
        let key = normalize_name(name);
        match self.store.get_routing_rule(&key).await {
            Ok(Some(rule)) => {
                return Base {
                    category: rule.category,
                    service: rule.recommended_service,
                    freshness_priority: rule.freshness_priority,
                    confidence_score: RULE_CONFIDENCE,
                    reasoning: RULE_MATCH,
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(ingredient = %key, error = %e, "routing rule lookup failed; using classifier");
            }
        }

        let c = self.classifier.classify(name);
        Base {
            category: c.category,
            service: c.recommended_service,
            freshness_priority: c.freshness_priority,
            confidence_score: AUTO_CONFIDENCE,
            reasoning: AUTO_CATEGORIZED,
        }
    }
}

fn apply_preferences(
    base: DeliveryService,
    freshness_priority: u8,
    prefs: &UserDeliveryPreferences,
) -> DeliveryService {
    let mut service = match prefs.default_service {
        ServicePreference::Auto => base,
        ServicePreference::Service(explicit) => explicit,
    };
    if freshness_priority >= FRESH_THRESHOLD && !prefs.auto_route_fresh_items {
        service = DeliveryService::Manual;
    }
    if freshness_priority <= PANTRY_THRESHOLD && !prefs.auto_route_pantry_items {
        service = DeliveryService::Manual;
    }
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quantity, RoutingRule};
    use crate::store::failing::FailingStore;
    use crate::store::memory::InMemoryStore;

    fn router(store: Arc<dyn Store>) -> Router {
        Router::new(store, Classifier::default())
    }

    fn item(name: &str) -> GroceryItem {
        GroceryItem::new(name, Quantity::Number(1.0), "")
    }

    async fn store_with_rule(rule: RoutingRule) -> Arc<dyn Store> {
        let store = InMemoryStore::new();
        store.upsert_routing_rule(&rule).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_full_auto_route() {
        let r = router(Arc::new(InMemoryStore::new()));
        let items = vec![
            GroceryItem::new("organic spinach", Quantity::Number(1.0), "bag"),
            GroceryItem::new("all-purpose flour", Quantity::Number(5.0), "lb"),
        ];
        let plan = r.route(&items, None).await;

        assert_eq!(plan.quick_delivery_items.len(), 1);
        let spinach = &plan.quick_delivery_items[0];
        assert_eq!(spinach.item.name, "organic spinach");
        assert_eq!(spinach.category, Category::FreshProduce);
        assert_eq!(spinach.reasoning, AUTO_CATEGORIZED);
        assert_eq!(spinach.confidence_score, 0.7);

        assert_eq!(plan.marketplace_items.len(), 1);
        let flour = &plan.marketplace_items[0];
        assert_eq!(flour.category, Category::Pantry);
        assert_eq!(flour.recommended_service, DeliveryService::Marketplace);
        assert!(plan.manual_items.is_empty());
    }

    #[tokio::test]
    async fn test_rule_takes_precedence() {
        let rule = RoutingRule::new("Spinach", Category::Pantry, DeliveryService::Marketplace, 4, 0.6)
            .unwrap();
        let r = router(store_with_rule(rule).await);

        let routed = r
            .route_item(&item(" SPINACH "), &UserDeliveryPreferences::defaults_for("u"))
            .await;
        assert_eq!(routed.category, Category::Pantry);
        assert_eq!(routed.recommended_service, DeliveryService::Marketplace);
        assert_eq!(routed.freshness_priority, 4);
        assert_eq!(routed.confidence_score, 1.0);
        assert_eq!(routed.reasoning, RULE_MATCH);
    }

    #[tokio::test]
    async fn test_explicit_default_beats_rule() {
        let rule = RoutingRule::new("spinach", Category::FreshProduce, DeliveryService::QuickDelivery, 7, 1.0)
            .unwrap();
        let r = router(store_with_rule(rule).await);
        let mut prefs = UserDeliveryPreferences::defaults_for("u");
        prefs.default_service = ServicePreference::Service(DeliveryService::Marketplace);

        let routed = r.route_item(&item("spinach"), &prefs).await;
        assert_eq!(routed.recommended_service, DeliveryService::Marketplace);
        assert_eq!(routed.reasoning, RULE_MATCH);
        assert_eq!(routed.confidence_score, 1.0);
    }

    #[tokio::test]
    async fn test_fresh_opt_out_downgrades_everything() {
        let rule = RoutingRule::new("salmon", Category::Meat, DeliveryService::QuickDelivery, 10, 1.0)
            .unwrap();
        let r = router(store_with_rule(rule).await);
        let mut prefs = UserDeliveryPreferences::defaults_for("u");
        prefs.default_service = ServicePreference::Service(DeliveryService::Marketplace);
        prefs.auto_route_fresh_items = false;

        let plan = r.route(&[item("salmon"), item("milk"), item("rice")], Some(&prefs)).await;
        let manual: Vec<&str> = plan.manual_items.iter().map(|i| i.item.name.as_str()).collect();
        assert_eq!(manual, vec!["salmon", "milk"]);
        assert_eq!(plan.marketplace_items.len(), 1);
        assert_eq!(plan.marketplace_items[0].item.name, "rice");
    }

    #[tokio::test]
    async fn test_pantry_opt_out() {
        let r = router(Arc::new(InMemoryStore::new()));
        let mut prefs = UserDeliveryPreferences::defaults_for("u");
        prefs.auto_route_pantry_items = false;

        let plan = r
            .route(&[item("flour"), item("frozen peas"), item("unobtainium")], Some(&prefs))
            .await;
        assert_eq!(plan.manual_items.len(), 1);
        assert_eq!(plan.manual_items[0].item.name, "flour");
        // Frozen (6) and other (5) sit between the thresholds
        assert_eq!(plan.quick_delivery_items[0].item.name, "frozen peas");
        assert_eq!(plan.marketplace_items[0].item.name, "unobtainium");
    }

    #[tokio::test]
    async fn test_rule_lookup_failure_falls_back_to_classifier() {
        let r = router(Arc::new(FailingStore));
        let plan = r.route(&[item("organic spinach")], None).await;
        assert_eq!(plan.quick_delivery_items.len(), 1);
        assert_eq!(plan.quick_delivery_items[0].reasoning, AUTO_CATEGORIZED);
    }

    #[tokio::test]
    async fn test_routing_is_repeatable() {
        let r = router(Arc::new(InMemoryStore::new()));
        let items = vec![item("tomato"), item("pasta"), item("chicken breast")];
        let first = r.route(&items, None).await;
        let second = r.route(&items, None).await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
