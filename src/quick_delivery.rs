//! Quick-delivery shopping-list client.
//!
//! Sends the quick-delivery group to the third-party shopping-list
//! endpoint and returns the link it hands back. Any problem (no key, a
//! malformed key, a non-2xx response, a network error or timeout) falls
//! back to a storefront search link built locally. Callers get a single
//! URL either way.
//!
//! ```text
//! POST {api_base}/products/products_link
//! Authorization: Bearer <key>
//!
//! { "title": ..., "link_type": "shopping_list", "line_items": [...] }
//!   → { "products_link_url": "https://..." }
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::affiliate::{clean_ingredient_name, LinkBuilder};
use crate::config::{Config, QuickDeliveryConfig};
use crate::models::GroceryItem;

const CAMPAIGN: &str = "quick_delivery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingLink {
    pub url: String,
    pub source: LinkSource,
}

#[derive(Serialize)]
struct LineItem<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<f64>,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: &'a str,
    display_text: String,
}

#[derive(Deserialize)]
struct ProductsLinkResponse {
    products_link_url: String,
}

pub struct ShoppingListClient {
    config: QuickDeliveryConfig,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ShoppingListClient {
    pub fn new(config: QuickDeliveryConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    /// Build a client, reading the key from the configured environment variable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let qd = &config.quick_delivery;
        let api_key = std::env::var(&qd.api_key_env).ok();
        Self::new(qd.clone(), api_key)
    }

    /// Shopping-list link for `items`, remote when possible.
    pub async fn shopping_list_link(
        &self,
        items: &[GroceryItem],
        user_id: &str,
        links: &LinkBuilder,
    ) -> ShoppingLink {
        let key = match self.api_key.as_deref().map(str::trim) {
            None | Some("") => {
                tracing::info!(
                    env = %self.config.api_key_env,
                    "quick-delivery API key not configured; using storefront search"
                );
                return self.fallback(items, links);
            }
            Some(k) if k.chars().any(|c| c.is_whitespace() || c.is_control()) => {
                tracing::warn!(
                    env = %self.config.api_key_env,
                    "quick-delivery API key is malformed; using storefront search"
                );
                return self.fallback(items, links);
            }
            Some(k) => k,
        };

        match self.create_remote(key, items).await {
            Ok(url) => {
                let tracking_id = format!("{}-{}", user_id, chrono::Utc::now().timestamp_millis());
                ShoppingLink {
                    url: links.tag(
                        &url,
                        &[("utm_campaign", CAMPAIGN), ("tracking_id", tracking_id.as_str())],
                    ),
                    source: LinkSource::Remote,
                }
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    error = %format!("{:#}", e),
                    "shopping-list request failed; using storefront search"
                );
                self.fallback(items, links)
            }
        }
    }

    async fn create_remote(&self, key: &str, items: &[GroceryItem]) -> Result<String> {
        let line_items: Vec<LineItem<'_>> = items
            .iter()
            .map(|item| LineItem {
                name: item.name.trim(),
                quantity: item.quantity.as_number(),
                unit: item.unit.trim(),
                display_text: display_text(item),
            })
            .collect();
        let body = serde_json::json!({
            "title": "Grocery list",
            "link_type": "shopping_list",
            "line_items": line_items,
        });

        let endpoint = format!(
            "{}/products/products_link",
            self.config.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", key))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("shopping-list API error {}: {}", status, body_text);
        }

        let parsed: ProductsLinkResponse = response
            .json()
            .await
            .context("invalid shopping-list API response")?;
        url::Url::parse(&parsed.products_link_url).with_context(|| {
            format!("shopping-list API returned a bad URL: {}", parsed.products_link_url)
        })?;
        Ok(parsed.products_link_url)
    }

    /// Storefront search for every item name. Depends only on its inputs.
    pub fn fallback(&self, items: &[GroceryItem], links: &LinkBuilder) -> ShoppingLink {
        let query = items
            .iter()
            .map(|i| clean_ingredient_name(&i.name))
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let mut params = vec![("utm_campaign", CAMPAIGN)];
        if !query.is_empty() {
            params.push(("k", query.as_str()));
        }
        ShoppingLink {
            url: links.tag(&self.config.storefront_search_url, &params),
            source: LinkSource::Fallback,
        }
    }
}

fn display_text(item: &GroceryItem) -> String {
    let quantity = item.quantity.to_string();
    [quantity.as_str(), item.unit.trim(), item.name.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
