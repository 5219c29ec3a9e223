//! SQLite-backed [`Store`].
//!
//! Wraps a `SqlitePool` created by [`db::connect`](crate::db::connect).
//! Keyword sets are stored as JSON arrays and searched with `json_each`;
//! name search uses `instr` so user input is never treated as a pattern.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{
    CartItem, DeliveryAddress, IngredientProductMapping, NewCartItem, NewProduct, Product,
    RoutingRule, ServiceClick, UserDeliveryPreferences,
};

use super::Store;

const PRODUCT_COLUMNS: &str = "p.id, p.category_id, p.name, p.marketplace_id, p.product_url, \
     p.price, p.image_url, p.brand, p.package_size, p.is_prime, p.search_keywords, \
     p.popularity_score, p.is_active";

const CART_COLUMNS: &str = "id, user_id, ingredient_name, quantity, unit, product_url, \
     product_name, price, image_url, marketplace_id, source_recipe_id, delivery_service, created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using the configured database path and ensure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn product_from_row(row: &SqliteRow) -> Product {
    let keywords_json: String = row.get("search_keywords");
    Product {
        id: row.get("id"),
        category_id: row.get("category_id"),
        name: row.get("name"),
        marketplace_id: row.get("marketplace_id"),
        product_url: row.get("product_url"),
        price: row.get("price"),
        image_url: row.get("image_url"),
        brand: row.get("brand"),
        package_size: row.get("package_size"),
        is_prime: row.get("is_prime"),
        search_keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        popularity_score: row.get("popularity_score"),
        is_active: row.get("is_active"),
    }
}

fn cart_item_from_row(row: &SqliteRow) -> CartItem {
    let service: Option<String> = row.get("delivery_service");
    CartItem {
        id: row.get("id"),
        user_id: row.get("user_id"),
        ingredient_name: row.get("ingredient_name"),
        quantity: row.get("quantity"),
        unit: row.get("unit"),
        product_url: row.get("product_url"),
        product_name: row.get("product_name"),
        price: row.get("price"),
        image_url: row.get("image_url"),
        marketplace_id: row.get("marketplace_id"),
        source_recipe_id: row.get("source_recipe_id"),
        delivery_service: service.and_then(|s| s.parse().ok()),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_routing_rule(&self, ingredient_name: &str) -> Result<Option<RoutingRule>> {
        let row = sqlx::query(
            "SELECT ingredient_name, category, recommended_service, freshness_priority, confidence_score \
             FROM routing_rules WHERE ingredient_name = ?",
        )
        .bind(ingredient_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let category: String = row.get("category");
        let service: String = row.get("recommended_service");
        let freshness: i64 = row.get("freshness_priority");
        Ok(Some(RoutingRule {
            ingredient_name: row.get("ingredient_name"),
            category: category.parse()?,
            recommended_service: service.parse()?,
            freshness_priority: freshness.clamp(0, 10) as u8,
            confidence_score: row.get("confidence_score"),
        }))
    }

    async fn upsert_routing_rule(&self, rule: &RoutingRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routing_rules
                (ingredient_name, category, recommended_service, freshness_priority, confidence_score, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(ingredient_name) DO UPDATE SET
                category = excluded.category,
                recommended_service = excluded.recommended_service,
                freshness_priority = excluded.freshness_priority,
                confidence_score = excluded.confidence_score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rule.ingredient_name)
        .bind(rule.category.as_str())
        .bind(rule.recommended_service.as_str())
        .bind(rule.freshness_priority as i64)
        .bind(rule.confidence_score)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserDeliveryPreferences>> {
        let row = sqlx::query(
            "SELECT user_id, default_service, delivery_address_json, delivery_instructions, \
             preferred_delivery_window, auto_route_fresh_items, auto_route_pantry_items, \
             enable_cost_optimization FROM delivery_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let default_service: String = row.get("default_service");
        let address_json: Option<String> = row.get("delivery_address_json");
        let delivery_address = match address_json {
            Some(json) => Some(
                serde_json::from_str::<DeliveryAddress>(&json)
                    .with_context(|| format!("corrupt delivery address for user {}", user_id))?,
            ),
            None => None,
        };

        Ok(Some(UserDeliveryPreferences {
            user_id: row.get("user_id"),
            default_service: default_service.parse()?,
            delivery_address,
            delivery_instructions: row.get("delivery_instructions"),
            preferred_delivery_window: row.get("preferred_delivery_window"),
            auto_route_fresh_items: row.get("auto_route_fresh_items"),
            auto_route_pantry_items: row.get("auto_route_pantry_items"),
            enable_cost_optimization: row.get("enable_cost_optimization"),
        }))
    }

    async fn save_preferences(&self, prefs: &UserDeliveryPreferences) -> Result<()> {
        let address_json = prefs
            .delivery_address
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO delivery_preferences
                (user_id, default_service, delivery_address_json, delivery_instructions,
                 preferred_delivery_window, auto_route_fresh_items, auto_route_pantry_items,
                 enable_cost_optimization, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                default_service = excluded.default_service,
                delivery_address_json = excluded.delivery_address_json,
                delivery_instructions = excluded.delivery_instructions,
                preferred_delivery_window = excluded.preferred_delivery_window,
                auto_route_fresh_items = excluded.auto_route_fresh_items,
                auto_route_pantry_items = excluded.auto_route_pantry_items,
                enable_cost_optimization = excluded.enable_cost_optimization,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&prefs.user_id)
        .bind(prefs.default_service.to_string())
        .bind(address_json)
        .bind(&prefs.delivery_instructions)
        .bind(&prefs.preferred_delivery_window)
        .bind(prefs.auto_route_fresh_items)
        .bind(prefs.auto_route_pantry_items)
        .bind(prefs.enable_cost_optimization)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_product(&self, product: &NewProduct) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let keywords = serde_json::to_string(&product.search_keywords)?;
        let (name_lower, keywords_lower) =
            migrate::search_columns(&product.name, &product.search_keywords)?;

        sqlx::query(
            r#"
            INSERT INTO products
                (id, category_id, name, marketplace_id, product_url, price, image_url, brand,
                 package_size, is_prime, search_keywords, name_lower, search_keywords_lower,
                 popularity_score, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?)
            "#,
        )
        .bind(&id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(&product.marketplace_id)
        .bind(&product.product_url)
        .bind(product.price)
        .bind(&product.image_url)
        .bind(&product.brand)
        .bind(&product.package_size)
        .bind(product.is_prime)
        .bind(keywords)
        .bind(name_lower)
        .bind(keywords_lower)
        .bind(now())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to insert product '{}' ({})",
                product.name,
                product.marketplace_id.as_deref().unwrap_or("no id")
            )
        })?;

        Ok(id)
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {} FROM products p WHERE p.id = ?", PRODUCT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn find_product_by_marketplace_id(
        &self,
        marketplace_id: &str,
    ) -> Result<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products p WHERE p.marketplace_id = ?",
            PRODUCT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(marketplace_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn upsert_mapping(&self, mapping: &IngredientProductMapping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingredient_product_mappings (ingredient_name, product_id, confidence_score)
            VALUES (?, ?, ?)
            ON CONFLICT(ingredient_name, product_id) DO UPDATE SET
                confidence_score = excluded.confidence_score
            "#,
        )
        .bind(&mapping.ingredient_name)
        .bind(&mapping.product_id)
        .bind(mapping.confidence_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mapped_products(&self, ingredient_name: &str, limit: usize) -> Result<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM ingredient_product_mappings m
            JOIN products p ON p.id = m.product_id
            WHERE m.ingredient_name = ?
            ORDER BY m.confidence_score DESC, m.product_id ASC
            LIMIT ?
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ingredient_name)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn search_products(
        &self,
        term: &str,
        category_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let term = term.trim().to_lowercase();
        let sql = format!(
            r#"
            SELECT {}
            FROM products p
            WHERE p.is_active = 1
              AND (?1 IS NULL OR p.category_id = ?1)
              AND (?2 = ''
                   OR instr(p.name_lower, ?2) > 0
                   OR EXISTS (SELECT 1 FROM json_each(p.search_keywords_lower) k
                              WHERE k.value = ?2))
            ORDER BY p.popularity_score DESC, p.name ASC, p.id ASC
            LIMIT ?3
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(category_id)
            .bind(&term)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn increment_popularity(&self, product_id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET popularity_score = popularity_score + 1 WHERE id = ?")
                .bind(product_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("product not found: {}", product_id);
        }
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
            created_at: now(),
        };

        let sql = format!(
            "INSERT INTO cart_items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CART_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(&row.user_id)
            .bind(&row.ingredient_name)
            .bind(&row.quantity)
            .bind(&row.unit)
            .bind(&row.product_url)
            .bind(&row.product_name)
            .bind(row.price)
            .bind(&row.image_url)
            .bind(&row.marketplace_id)
            .bind(&row.source_recipe_id)
            .bind(row.delivery_service.map(|s| s.as_str()))
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_cart_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let sql = format!(
            "SELECT {} FROM cart_items WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
            CART_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(cart_item_from_row).collect())
    }

    async fn record_service_click(&self, click: &ServiceClick) -> Result<()> {
        sqlx::query(
            "INSERT INTO service_clicks (user_id, service, item_count, clicked_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&click.user_id)
        .bind(click.service.as_str())
        .bind(click.item_count as i64)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
