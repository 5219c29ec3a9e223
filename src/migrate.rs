use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Per-ingredient routing overrides, keyed by normalized name
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS routing_rules (
            ingredient_name TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            recommended_service TEXT NOT NULL,
            freshness_priority INTEGER NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 1.0,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delivery_preferences (
            user_id TEXT PRIMARY KEY,
            default_service TEXT NOT NULL DEFAULT 'auto',
            delivery_address_json TEXT,
            delivery_instructions TEXT NOT NULL DEFAULT '',
            preferred_delivery_window TEXT NOT NULL DEFAULT '',
            auto_route_fresh_items INTEGER NOT NULL DEFAULT 1,
            auto_route_pantry_items INTEGER NOT NULL DEFAULT 1,
            enable_cost_optimization INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            name TEXT NOT NULL,
            marketplace_id TEXT UNIQUE,
            product_url TEXT NOT NULL,
            price REAL,
            image_url TEXT,
            brand TEXT,
            package_size TEXT,
            is_prime INTEGER NOT NULL DEFAULT 0,
            search_keywords TEXT NOT NULL DEFAULT '[]',
            name_lower TEXT NOT NULL DEFAULT '',
            search_keywords_lower TEXT NOT NULL DEFAULT '[]',
            popularity_score INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingredient_product_mappings (
            ingredient_name TEXT NOT NULL,
            product_id TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            PRIMARY KEY (ingredient_name, product_id),
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only per-user cart lines
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cart_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            ingredient_name TEXT NOT NULL,
            quantity TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            product_url TEXT NOT NULL,
            product_name TEXT NOT NULL,
            price REAL,
            image_url TEXT,
            marketplace_id TEXT,
            source_recipe_id TEXT,
            delivery_service TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_clicks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            service TEXT NOT NULL,
            item_count INTEGER NOT NULL,
            clicked_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_column_if_missing(pool, "products", "name_lower", "TEXT NOT NULL DEFAULT ''").await?;
    add_column_if_missing(
        pool,
        "products",
        "search_keywords_lower",
        "TEXT NOT NULL DEFAULT '[]'",
    )
    .await?;
    backfill_search_columns(pool).await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mappings_ingredient ON ingredient_product_mappings(ingredient_name, confidence_score DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_popularity ON products(popularity_score DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cart_items_user ON cart_items(user_id, created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if count == 0 {
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Fill the lower-cased search columns for rows written before they existed.
///
/// SQLite's `lower()` only folds ASCII, so folding happens here in Rust.
async fn backfill_search_columns(pool: &SqlitePool) -> Result<()> {
    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT id, name, search_keywords FROM products WHERE name_lower = ''")
            .fetch_all(pool)
            .await?;
    for (id, name, keywords_json) in rows {
        let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_default();
        let (name_lower, keywords_lower) = search_columns(&name, &keywords)?;
        sqlx::query(
            "UPDATE products SET name_lower = ?1, search_keywords_lower = ?2 WHERE id = ?3",
        )
        .bind(name_lower)
        .bind(keywords_lower)
        .bind(id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Lower-cased name and JSON keyword array stored alongside each product.
pub fn search_columns(name: &str, keywords: &[String]) -> Result<(String, String)> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    Ok((name.to_lowercase(), serde_json::to_string(&lowered)?))
}
