//! TOML configuration.
//!
//! Every table and URL the pipeline uses is read from here and handed to
//! the components at construction time, so tests can swap in fixtures.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::DeliveryService;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub classifier: KeywordTable,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub quick_delivery: QuickDeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Keyword sets for the ingredient classifier, tested in field order.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KeywordTable {
    pub fresh_produce: Vec<String>,
    pub meat: Vec<String>,
    pub dairy: Vec<String>,
    pub frozen: Vec<String>,
    pub pantry: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            fresh_produce: words(&[
                "fresh", "organic", "produce", "vegetable", "fruit", "greens", "lettuce",
                "tomato", "cucumber", "carrot", "onion", "garlic", "bell pepper", "mushroom",
                "spinach", "kale", "broccoli", "cauliflower",
            ]),
            meat: words(&[
                "chicken", "beef", "pork", "turkey", "lamb", "fish", "salmon", "shrimp", "meat",
                "steak", "ground", "breast", "thigh", "tenderloin",
            ]),
            dairy: words(&[
                "milk", "cheese", "yogurt", "butter", "cream", "sour cream", "cottage cheese",
                "mozzarella", "cheddar", "parmesan", "eggs",
            ]),
            frozen: words(&[
                "frozen", "ice cream", "popsicle", "frozen peas", "frozen corn",
                "frozen berries", "frozen vegetables",
            ]),
            pantry: words(&[
                "rice", "pasta", "flour", "sugar", "salt", "pepper", "oil", "vinegar", "sauce",
                "canned", "dried", "spice", "seasoning", "baking powder", "baking soda",
                "vanilla extract",
            ]),
        }
    }
}

impl KeywordTable {
    /// Trim and lower-case every keyword, dropping empty ones.
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.fresh_produce,
            &mut self.meat,
            &mut self.dairy,
            &mut self.frozen,
            &mut self.pantry,
        ] {
            for word in list.iter_mut() {
                *word = word.trim().to_lowercase();
            }
            list.retain(|w| !w.is_empty());
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AffiliateConfig {
    pub tag: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            tag: "mealscrape-20".to_string(),
            utm_source: "mealscrape".to_string(),
            utm_medium: "app".to_string(),
            utm_campaign: "grocery".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub search_url: String,
    pub cart_url: String,
    pub product_url: String,
    /// Department filter applied to search links, per target service.
    pub departments: BTreeMap<DeliveryService, String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        let mut departments = BTreeMap::new();
        departments.insert(DeliveryService::QuickDelivery, "amazonfresh".to_string());
        Self {
            search_url: "https://www.amazon.com/s".to_string(),
            cart_url: "https://www.amazon.com/gp/aws/cart/add.html".to_string(),
            product_url: "https://www.amazon.com/dp".to_string(),
            departments,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MatcherConfig {
    #[serde(default = "default_match_limit")]
    pub limit: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            limit: default_match_limit(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_match_limit() -> usize {
    5
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct QuickDeliveryConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the API key. Unset means "use the fallback".
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_storefront_search_url")]
    pub storefront_search_url: String,
}

impl Default for QuickDeliveryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            storefront_search_url: default_storefront_search_url(),
        }
    }
}

fn default_api_base() -> String {
    "https://connect.instacart.com/idp/v1".to_string()
}
fn default_api_key_env() -> String {
    "QUICK_DELIVERY_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_storefront_search_url() -> String {
    "https://www.instacart.com/store/s".to_string()
}

impl Config {
    /// Fully-defaulted configuration with an in-tree database path.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/basket.sqlite"),
            },
            server: ServerConfig::default(),
            classifier: KeywordTable::default(),
            affiliate: AffiliateConfig::default(),
            marketplace: MarketplaceConfig::default(),
            matcher: MatcherConfig::default(),
            quick_delivery: QuickDeliveryConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.affiliate.tag.trim().is_empty() {
        anyhow::bail!("affiliate.tag must not be empty");
    }

    for (name, value) in [
        ("marketplace.search_url", &config.marketplace.search_url),
        ("marketplace.cart_url", &config.marketplace.cart_url),
        ("marketplace.product_url", &config.marketplace.product_url),
        ("quick_delivery.api_base", &config.quick_delivery.api_base),
        (
            "quick_delivery.storefront_search_url",
            &config.quick_delivery.storefront_search_url,
        ),
    ] {
        url::Url::parse(value)
            .with_context(|| format!("{} must be an absolute URL, got '{}'", name, value))?;
    }

    if config.matcher.limit < 1 {
        anyhow::bail!("matcher.limit must be >= 1");
    }
    if config.matcher.concurrency < 1 {
        anyhow::bail!("matcher.concurrency must be >= 1");
    }
    if config.quick_delivery.timeout_secs < 1 {
        anyhow::bail!("quick_delivery.timeout_secs must be >= 1");
    }

    Ok(())
}
