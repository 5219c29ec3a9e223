//! Keyword-based ingredient classification.
//!
//! [`Classifier::classify`] is pure and total: it lower-cases the name and
//! tests it against the configured keyword sets in a fixed priority order
//! (fresh produce, meat, dairy, frozen, pantry). A keyword matches when it
//! appears anywhere in the name. The first matching set decides the
//! category; no match means [`Category::Other`].
//!
//! ```rust
//! use basket_router::classifier::Classifier;
//! use basket_router::config::KeywordTable;
//! use basket_router::models::{Category, DeliveryService};
//!
//! let classifier = Classifier::new(KeywordTable::default());
//! let c = classifier.classify("Organic Spinach");
//! assert_eq!(c.category, Category::FreshProduce);
//! assert_eq!(c.recommended_service, DeliveryService::QuickDelivery);
//! assert_eq!(c.freshness_priority, 10);
//! ```

use crate::config::KeywordTable;
use crate::models::{Category, DeliveryService};

/// Result of classifying one ingredient name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub freshness_priority: u8,
    pub recommended_service: DeliveryService,
}

impl From<Category> for Classification {
    fn from(category: Category) -> Self {
        Self {
            category,
            freshness_priority: category.freshness_priority(),
            recommended_service: category.default_service(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    ordered: Vec<(Category, Vec<String>)>,
}

impl Classifier {
    /// Keywords are trimmed and lower-cased here, so any table works.
    pub fn new(table: KeywordTable) -> Self {
        let table = table.normalized();
        let ordered = vec![
            (Category::FreshProduce, table.fresh_produce),
            (Category::Meat, table.meat),
            (Category::Dairy, table.dairy),
            (Category::Frozen, table.frozen),
            (Category::Pantry, table.pantry),
        ];
        Self { ordered }
    }

    pub fn classify(&self, name: &str) -> Classification {
        let lower = name.to_lowercase();
        self.ordered
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|(category, _)| Classification::from(*category))
            .unwrap_or_else(|| Classification::from(Category::Other))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(KeywordTable::default())
    }
}
