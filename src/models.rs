//! Core data models used throughout the routing and checkout pipeline.
//!
//! Grocery items flow in as [`GroceryItem`], are enriched into
//! [`RoutedItem`] by the router, resolved into [`ResolvedLine`] by the
//! product matcher and finally reconciled into a [`CheckoutResult`]. Only
//! [`CartItem`] rows outlive a single request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Normalize an ingredient name into its lookup key: trimmed and lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============ Quantity ============

/// A recipe quantity. Recipes carry either plain numbers or free text
/// (`"1 1/2"`, `"a pinch"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Quantity {
    /// Numeric value of the quantity, if it has one.
    ///
    /// Text is accepted as a decimal (`"1.5"`), a fraction (`"1/2"`) or a
    /// mixed number (`"1 1/2"`). Anything else is non-numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Quantity::Number(n) if n.is_finite() && *n >= 0.0 => Some(*n),
            Quantity::Number(_) => None,
            Quantity::Text(text) => parse_quantity_text(text),
        }
    }

    /// Whole-unit count used for cart-add links: rounded up, never below 1.
    pub fn cart_count(&self) -> u32 {
        match self.as_number() {
            Some(n) if n > 1.0 => n.ceil().min(u32::MAX as f64) as u32,
            _ => 1,
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Number(1.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Number(n) => write!(f, "{}", n),
            Quantity::Text(t) => write!(f, "{}", t.trim()),
        }
    }
}

fn parse_quantity_text(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(n) = text.parse::<f64>() {
        return (n.is_finite() && n >= 0.0).then_some(n);
    }
    let mut parts = text.split_whitespace();
    let first = parts.next()?;
    match parts.next() {
        None => parse_fraction(first),
        Some(frac) if parts.next().is_none() => {
            let whole: f64 = first.parse().ok()?;
            Some(whole + parse_fraction(frac)?)
        }
        Some(_) => None,
    }
}

fn parse_fraction(text: &str) -> Option<f64> {
    let (num, den) = text.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num < 0.0 || den < 0.0 {
        return None;
    }
    Some(num / den)
}

// ============ Classification ============

/// Coarse ingredient category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FreshProduce,
    Meat,
    Dairy,
    Frozen,
    Pantry,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::FreshProduce,
        Category::Meat,
        Category::Dairy,
        Category::Frozen,
        Category::Pantry,
        Category::Other,
    ];

    /// Fixed freshness priority for the category.
    pub fn freshness_priority(self) -> u8 {
        match self {
            Category::FreshProduce | Category::Meat => 10,
            Category::Dairy => 9,
            Category::Frozen => 6,
            Category::Other => 5,
            Category::Pantry => 2,
        }
    }

    /// Service an item of this category goes to when nothing overrides it.
    pub fn default_service(self) -> DeliveryService {
        match self {
            Category::FreshProduce | Category::Meat | Category::Dairy | Category::Frozen => {
                DeliveryService::QuickDelivery
            }
            Category::Pantry | Category::Other => DeliveryService::Marketplace,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::FreshProduce => "fresh_produce",
            Category::Meat => "meat",
            Category::Dairy => "dairy",
            Category::Frozen => "frozen",
            Category::Pantry => "pantry",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown category: '{}'. Must be fresh_produce, meat, dairy, frozen, pantry, or other.",
                    s
                )
            })
    }
}

/// Destination fulfillment channel for a grocery item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryService {
    QuickDelivery,
    Marketplace,
    Manual,
}

impl DeliveryService {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryService::QuickDelivery => "quick_delivery",
            DeliveryService::Marketplace => "marketplace",
            DeliveryService::Manual => "manual",
        }
    }

    /// Human-facing label.
    pub fn display_name(self) -> &'static str {
        match self {
            DeliveryService::QuickDelivery => "Quick delivery",
            DeliveryService::Marketplace => "Marketplace",
            DeliveryService::Manual => "Choose service",
        }
    }
}

impl fmt::Display for DeliveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryService {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "quick_delivery" => Ok(DeliveryService::QuickDelivery),
            "marketplace" => Ok(DeliveryService::Marketplace),
            "manual" => Ok(DeliveryService::Manual),
            other => anyhow::bail!(
                "Unknown delivery service: '{}'. Must be quick_delivery, marketplace, or manual.",
                other
            ),
        }
    }
}

/// A user's default service selection: automatic routing or a fixed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServicePreference {
    #[default]
    Auto,
    Service(DeliveryService),
}

impl fmt::Display for ServicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServicePreference::Auto => f.write_str("auto"),
            ServicePreference::Service(s) => f.write_str(s.as_str()),
        }
    }
}

impl FromStr for ServicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(ServicePreference::Auto),
            other => Ok(ServicePreference::Service(other.parse()?)),
        }
    }
}

impl TryFrom<String> for ServicePreference {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServicePreference> for String {
    fn from(value: ServicePreference) -> Self {
        value.to_string()
    }
}

// ============ Routing ============

/// A line from a recipe or grocery list. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Quantity,
    #[serde(default)]
    pub unit: String,
    /// Recipe the line came from, carried through to cart rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_recipe_id: Option<String>,
}

impl GroceryItem {
    pub fn new(name: impl Into<String>, quantity: Quantity, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit: unit.into(),
            source_recipe_id: None,
        }
    }
}

/// A grocery item plus the routing decision for the current pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedItem {
    #[serde(flatten)]
    pub item: GroceryItem,
    pub category: Category,
    pub recommended_service: DeliveryService,
    pub freshness_priority: u8,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// Routed items grouped by final service, each group in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingPlan {
    pub quick_delivery_items: Vec<RoutedItem>,
    pub marketplace_items: Vec<RoutedItem>,
    pub manual_items: Vec<RoutedItem>,
}

impl RoutingPlan {
    pub fn items_for(&self, service: DeliveryService) -> &[RoutedItem] {
        match service {
            DeliveryService::QuickDelivery => &self.quick_delivery_items,
            DeliveryService::Marketplace => &self.marketplace_items,
            DeliveryService::Manual => &self.manual_items,
        }
    }

    pub fn len(&self) -> usize {
        self.quick_delivery_items.len() + self.marketplace_items.len() + self.manual_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted per-ingredient override of the keyword classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Normalized (trimmed, lower-cased) ingredient name.
    pub ingredient_name: String,
    pub category: Category,
    pub recommended_service: DeliveryService,
    pub freshness_priority: u8,
    pub confidence_score: f64,
}

impl RoutingRule {
    /// Build a rule with a normalized key, rejecting out-of-range values.
    pub fn new(
        ingredient_name: &str,
        category: Category,
        recommended_service: DeliveryService,
        freshness_priority: u8,
        confidence_score: f64,
    ) -> Result<Self, PipelineError> {
        let key = normalize_name(ingredient_name);
        if key.is_empty() {
            return Err(PipelineError::InvalidRoutingRule(
                "ingredient name must not be empty".to_string(),
            ));
        }
        if freshness_priority > 10 {
            return Err(PipelineError::InvalidRoutingRule(format!(
                "freshness priority must be 0-10, got {}",
                freshness_priority
            )));
        }
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(PipelineError::InvalidRoutingRule(format!(
                "confidence score must be in [0, 1], got {}",
                confidence_score
            )));
        }
        Ok(Self {
            ingredient_name: key,
            category,
            recommended_service,
            freshness_priority,
            confidence_score,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// One record per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeliveryPreferences {
    pub user_id: String,
    #[serde(default)]
    pub default_service: ServicePreference,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    #[serde(default)]
    pub delivery_instructions: String,
    #[serde(default)]
    pub preferred_delivery_window: String,
    #[serde(default = "default_true")]
    pub auto_route_fresh_items: bool,
    #[serde(default = "default_true")]
    pub auto_route_pantry_items: bool,
    #[serde(default)]
    pub enable_cost_optimization: bool,
}

fn default_true() -> bool {
    true
}

impl UserDeliveryPreferences {
    /// Preferences used for a user with no stored record.
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            default_service: ServicePreference::Auto,
            delivery_address: None,
            delivery_instructions: String::new(),
            preferred_delivery_window: String::new(),
            auto_route_fresh_items: true,
            auto_route_pantry_items: true,
            enable_cost_optimization: false,
        }
    }
}

// ============ Catalog ============

/// A catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    /// Marketplace identifier (ASIN-style), validated on import.
    pub marketplace_id: Option<String>,
    pub product_url: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub brand: Option<String>,
    pub package_size: Option<String>,
    pub is_prime: bool,
    pub search_keywords: Vec<String>,
    pub popularity_score: i64,
    pub is_active: bool,
}

/// Catalog row prior to insertion; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub category_id: String,
    pub name: String,
    pub marketplace_id: Option<String>,
    pub product_url: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub brand: Option<String>,
    pub package_size: Option<String>,
    pub is_prime: bool,
    pub search_keywords: Vec<String>,
}

/// Learned association from a normalized ingredient name to a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientProductMapping {
    pub ingredient_name: String,
    pub product_id: String,
    pub confidence_score: f64,
}

// ============ Checkout ============

/// Aggregator input: a grocery line with its resolved product reference, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLine {
    pub name: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub unit: String,
    pub product_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedItem {
    pub name: String,
    pub product_ref: String,
    pub quantity: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// An amount that could not be merged into an entry's primary unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amount {
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedItem {
    pub ingredient: String,
    pub search_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Amounts in units incompatible with `unit`, summed per unit.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_amounts: Vec<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResult {
    pub mapped_items: Vec<MappedItem>,
    pub unmapped_items: Vec<UnmappedItem>,
    pub cart_url: Option<String>,
    pub has_cart_items: bool,
    pub has_unmapped_items: bool,
}

// ============ Cart ============

/// A durable cart row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub ingredient_name: String,
    pub quantity: String,
    pub unit: String,
    pub product_url: String,
    pub product_name: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub marketplace_id: Option<String>,
    pub source_recipe_id: Option<String>,
    pub delivery_service: Option<DeliveryService>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub user_id: String,
    pub ingredient_name: String,
    pub quantity: String,
    pub unit: String,
    pub product_url: String,
    pub product_name: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub marketplace_id: Option<String>,
    pub source_recipe_id: Option<String>,
    pub delivery_service: Option<DeliveryService>,
}

/// Click-through record for a checkout against a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceClick {
    pub user_id: String,
    pub service: DeliveryService,
    pub item_count: usize,
}
