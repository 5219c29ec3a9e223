//! Product catalog import.
//!
//! Reads a comma-separated file whose header names the columns. `asin`,
//! `name` and `category` are required; `price`, `image_url`, `keywords`
//! (`;`-separated), `brand`, `package_size` and `is_prime` are optional.
//! Fields are unquoted.
//!
//! Every identifier is checked against the marketplace pattern before it
//! reaches the store. Bad rows are reported and skipped; the import
//! continues.

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::affiliate::LinkBuilder;
use crate::error::PipelineError;
use crate::models::NewProduct;
use crate::store::Store;

lazy_static! {
    static ref MARKETPLACE_ID: Regex =
        Regex::new(r"^B[A-Z0-9]{9}$").expect("marketplace id pattern should be valid");
}

const REQUIRED_COLUMNS: [&str; 3] = ["asin", "name", "category"];

/// Reject identifiers that are not `B` followed by nine uppercase
/// alphanumerics.
pub fn validate_marketplace_id(id: &str) -> Result<(), PipelineError> {
    if MARKETPLACE_ID.is_match(id) {
        Ok(())
    } else {
        Err(PipelineError::InvalidMarketplaceId(id.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Parse `text` and insert each valid row.
///
/// Fails only when the file has no data rows or lacks a required column.
pub async fn import_csv(store: &dyn Store, links: &LinkBuilder, text: &str) -> Result<ImportReport> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        bail!("CSV file is empty");
    };
    let headers: Vec<String> = header.split(',').map(|h| h.trim().to_lowercase()).collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        bail!("Missing required CSV columns: {}", missing.join(", "));
    }

    let mut report = ImportReport::default();
    for (n, line) in lines.enumerate() {
        let row_number = n + 2;
        let values: Vec<&str> = line.split(',').map(str::trim).collect();
        if values.len() != headers.len() {
            report.fail(format!(
                "row {}: expected {} columns, found {}",
                row_number,
                headers.len(),
                values.len()
            ));
            continue;
        }
        let field = |name: &str| column(&headers, &values, name);

        let (Some(asin), Some(name), Some(category)) =
            (field("asin"), field("name"), field("category"))
        else {
            report.fail(format!("row {}: asin, name and category are required", row_number));
            continue;
        };

        if let Err(e) = validate_marketplace_id(asin) {
            report.fail(e.to_string());
            continue;
        }

        let price = match field("price").map(str::parse::<f64>) {
            None => None,
            Some(Ok(p)) if p.is_finite() && p >= 0.0 => Some(p),
            Some(_) => {
                report.fail(format!("{}: invalid price", asin));
                continue;
            }
        };

        match store.find_product_by_marketplace_id(asin).await {
            Ok(Some(_)) => {
                report.fail(format!("Duplicate ASIN: {}", asin));
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                report.fail(format!("{}: {}", asin, e));
                continue;
            }
        }

        let product = NewProduct {
            category_id: category.to_string(),
            name: name.to_string(),
            marketplace_id: Some(asin.to_string()),
            product_url: links.product_url(asin),
            price,
            image_url: field("image_url").map(str::to_string),
            brand: field("brand").map(str::to_string),
            package_size: field("package_size").map(str::to_string),
            is_prime: matches!(field("is_prime"), Some("true") | Some("1")),
            search_keywords: field("keywords")
                .map(|k| {
                    k.split(';')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        match store.insert_product(&product).await {
            Ok(_) => report.imported += 1,
            Err(e) => report.fail(format!("{}: {}", asin, e)),
        }
    }

    tracing::info!(
        imported = report.imported,
        failed = report.failed,
        "catalog import finished"
    );
    Ok(report)
}

fn column<'a>(headers: &[String], values: &[&'a str], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h == name)
        .map(|i| values[i])
        .filter(|v| !v.is_empty())
}

impl ImportReport {
    fn fail(&mut self, message: String) {
        tracing::warn!(error = %message, "catalog row rejected");
        self.failed += 1;
        self.errors.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AffiliateConfig, MarketplaceConfig};
    use crate::store::memory::InMemoryStore;

    fn links() -> LinkBuilder {
        LinkBuilder::new(AffiliateConfig::default(), MarketplaceConfig::default())
    }

    #[test]
    fn test_validate_marketplace_id() {
        assert!(validate_marketplace_id("B001E5E3KG").is_ok());
        assert!(validate_marketplace_id("A001E5E3KG").is_err());
        assert!(validate_marketplace_id("B001e5e3kg").is_err());
        assert!(validate_marketplace_id("B001E5E3K").is_err());
        assert!(validate_marketplace_id(" B001E5E3KG").is_err());
    }

    #[tokio::test]
    async fn test_import_valid_rows() {
        let store = InMemoryStore::new();
        let csv = "asin,name,category,price,keywords,is_prime\n\
                   B001E5E3KG,Gold Medal Flour,baking,4.99,flour;all-purpose,true\n\
                   B00I8G8AKO,Cane Sugar,baking,,sugar,0\n";
        let report = import_csv(&store, &links(), csv).await.unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.failed, 0);

        let flour = store
            .find_product_by_marketplace_id("B001E5E3KG")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(flour.price, Some(4.99));
        assert!(flour.is_prime);
        assert_eq!(flour.search_keywords, vec!["flour", "all-purpose"]);
        assert!(flour
            .product_url
            .starts_with("https://www.amazon.com/dp/B001E5E3KG?tag=mealscrape-20"));

        let sugar = store
            .find_product_by_marketplace_id("B00I8G8AKO")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sugar.price, None);
        assert!(!sugar.is_prime);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_rows() {
        let store = InMemoryStore::new();
        let csv = "ASIN, Name, Category\n\
                   B001E5E3KG,Flour,baking\n\
                   not-an-asin,Salt,baking\n\
                   B001E5E3KG,Flour again,baking\n\
                   B00I8G8AKO,,baking\n\
                   B00I8G8AKO,Sugar\n";
        let report = import_csv(&store, &links(), csv).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.failed, 4);
        assert!(report.errors[0].contains("not-an-asin"));
        assert!(report.errors[1].contains("Duplicate ASIN"));
    }

    #[tokio::test]
    async fn test_missing_columns_fail_the_import() {
        let store = InMemoryStore::new();
        let err = import_csv(&store, &links(), "asin,name\nB001E5E3KG,Flour\n")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("category"));
        assert!(import_csv(&store, &links(), "\n\n").await.is_err());
    }
}
