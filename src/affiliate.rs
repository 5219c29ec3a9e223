//! Outbound commerce link construction.
//!
//! Every URL that leaves the pipeline passes through [`LinkBuilder::tag`],
//! which sets the affiliate tag and the attribution parameters. Setting a
//! parameter replaces an existing value in place, so tagging is idempotent.
//! Malformed URLs are never an error: they fall back to plain query-string
//! concatenation.

use lazy_static::lazy_static;
use regex::Regex;
use url::{form_urlencoded, Url};

use crate::config::{AffiliateConfig, Config, MarketplaceConfig};
use crate::models::MappedItem;

lazy_static! {
    static ref BRACKETED: Regex =
        Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("bracket pattern should be valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern should be valid");
}

/// Strip parenthetical and bracketed notes and collapse whitespace.
///
/// `"flour (sifted) [divided]"` becomes `"flour"`.
pub fn clean_ingredient_name(name: &str) -> String {
    let stripped = BRACKETED.replace_all(name, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

#[derive(Debug, Clone)]
pub struct LinkBuilder {
    affiliate: AffiliateConfig,
    marketplace: MarketplaceConfig,
}

impl LinkBuilder {
    pub fn new(affiliate: AffiliateConfig, marketplace: MarketplaceConfig) -> Self {
        Self {
            affiliate,
            marketplace,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.affiliate.clone(), config.marketplace.clone())
    }

    pub fn marketplace(&self) -> &MarketplaceConfig {
        &self.marketplace
    }

    /// Set the affiliate tag and attribution parameters on `url`, then
    /// apply `extra` so call sites can override attribution.
    pub fn tag(&self, url: &str, extra: &[(&str, &str)]) -> String {
        let mut params: Vec<(&str, &str)> = vec![
            ("tag", self.affiliate.tag.as_str()),
            ("utm_source", self.affiliate.utm_source.as_str()),
            ("utm_medium", self.affiliate.utm_medium.as_str()),
            ("utm_campaign", self.affiliate.utm_campaign.as_str()),
        ];
        params.extend_from_slice(extra);
        set_params(url, &params)
    }

    /// Manual-search link for one ingredient, optionally scoped to a department.
    pub fn search_url(&self, ingredient: &str, department: Option<&str>) -> String {
        let cleaned = clean_ingredient_name(ingredient);
        let mut params = vec![("k", cleaned.as_str())];
        if let Some(dept) = department.filter(|d| !d.is_empty()) {
            params.push(("i", dept));
        }
        self.tag(&set_params(&self.marketplace.search_url, &params), &[])
    }

    /// Single cart-add link carrying every item as `ItemId.N` / `Quantity.N`
    /// in input order.
    pub fn cart_url(&self, items: &[MappedItem]) -> String {
        let numbered: Vec<(String, String)> = items
            .iter()
            .enumerate()
            .flat_map(|(i, item)| {
                let n = i + 1;
                [
                    (format!("ItemId.{}", n), item.product_ref.clone()),
                    (format!("Quantity.{}", n), item.quantity.cart_count().to_string()),
                ]
            })
            .collect();
        let params: Vec<(&str, &str)> = numbered
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        // The cart-add endpoint attributes by AssociateTag, not tag
        self.tag(
            &set_params(&self.marketplace.cart_url, &params),
            &[("AssociateTag", self.affiliate.tag.as_str())],
        )
    }

    /// Tagged product page link for a marketplace identifier.
    pub fn product_url(&self, marketplace_id: &str) -> String {
        let base = self.marketplace.product_url.trim_end_matches('/');
        self.tag(&format!("{}/{}", base, marketplace_id), &[])
    }
}

/// Set each `(key, value)` on the query string of `url`, replacing the first
/// existing occurrence and dropping duplicates.
fn set_params(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    match Url::parse(url) {
        Ok(mut parsed) if !parsed.cannot_be_a_base() => {
            let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
            for (key, value) in params {
                set_pair(&mut pairs, key, value);
            }
            parsed.query_pairs_mut().clear().extend_pairs(&pairs);
            parsed.to_string()
        }
        _ => set_params_naive(url, params),
    }
}

fn set_params_naive(url: &str, params: &[(&str, &str)]) -> String {
    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    for (key, value) in params {
        set_pair(&mut pairs, key, value);
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .finish();
    format!("{}?{}", base, query)
}

fn set_pair(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    let mut seen = false;
    pairs.retain_mut(|(k, v)| {
        if k.as_str() != key {
            return true;
        }
        if seen {
            return false;
        }
        seen = true;
        *v = value.to_string();
        true
    });
    if !seen {
        pairs.push((key.to_string(), value.to_string()));
    }
}
