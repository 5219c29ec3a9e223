//! # Basket Router CLI (`basket`)
//!
//! The `basket` binary is the operator interface for Basket Router. It
//! initializes the database, loads the product catalog, manages routing
//! rules, learned mappings and preferences, runs routing and checkout over
//! grocery-list files, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! basket --config ./config/basket.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `basket init` | Create the SQLite database and run schema migrations |
//! | `basket classify "<name>"` | Classify one ingredient name |
//! | `basket route <list.json> --user <id>` | Show the routing plan for a grocery list |
//! | `basket checkout <list.json> --user <id>` | Route, resolve, add to cart and print links |
//! | `basket import <catalog.csv>` | Import products from CSV |
//! | `basket map <ingredient> <asin>` | Learn an ingredient → product mapping |
//! | `basket rule <ingredient> ...` | Upsert a routing override |
//! | `basket prefs show\|set --user <id>` | Show or update delivery preferences |
//! | `basket cart --user <id>` | List a user's cart, newest first |
//! | `basket search "<term>"` | Search the catalog |
//! | `basket serve` | Start the HTTP server |
//!
//! Grocery-list files are JSON arrays of
//! `{ "name": ..., "quantity": ..., "unit": ..., "source_recipe_id": ... }`.
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use basket_router::catalog;
use basket_router::classifier::Classifier;
use basket_router::config::{self, Config};
use basket_router::matcher::ProductMatcher;
use basket_router::migrate;
use basket_router::models::{
    Category, DeliveryAddress, DeliveryService, GroceryItem, RoutingPlan, RoutingRule,
    ServicePreference,
};
use basket_router::pipeline::{CheckoutSummary, Pipeline};
use basket_router::server;
use basket_router::store::sqlite::SqliteStore;
use basket_router::store::Store;

/// Basket Router: grocery delivery routing and checkout reconciliation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/basket.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "basket",
    about = "Basket Router: route grocery lists to delivery services and build checkout links",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/basket.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Classify an ingredient name with the keyword tables.
    ///
    /// Runs without a database; falls back to the built-in keyword tables
    /// when the config file cannot be loaded.
    Classify {
        /// Ingredient name, e.g. "organic spinach".
        name: String,
    },

    /// Show how a grocery list would be routed.
    Route {
        /// Path to a JSON grocery list.
        file: PathBuf,

        /// User whose preferences apply.
        #[arg(long)]
        user: String,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Route a grocery list and build its checkout.
    ///
    /// Quick-delivery items become a shopping-list link, marketplace items
    /// are resolved to products, added to the cart and combined into a
    /// cart link, and anything else gets a search link.
    Checkout {
        /// Path to a JSON grocery list.
        file: PathBuf,

        #[arg(long)]
        user: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import products from a CSV file.
    Import {
        /// CSV with `asin,name,category` and optional columns.
        file: PathBuf,
    },

    /// Map an ingredient to a catalog product by marketplace identifier.
    Map {
        ingredient: String,

        /// Marketplace identifier of an imported product.
        marketplace_id: String,

        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },

    /// Create or replace a routing override for an ingredient.
    Rule {
        ingredient: String,

        /// fresh_produce, meat, dairy, frozen, pantry or other.
        #[arg(long)]
        category: Category,

        /// quick_delivery, marketplace or manual.
        #[arg(long)]
        service: DeliveryService,

        /// 0-10. Defaults to the category's priority.
        #[arg(long)]
        freshness: Option<u8>,

        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },

    /// Show or update a user's delivery preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// List a user's cart, newest first.
    Cart {
        #[arg(long)]
        user: String,
    },

    /// Search the product catalog.
    Search {
        term: String,

        /// Restrict to a catalog category id.
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print stored preferences (or the defaults) as JSON.
    Show {
        #[arg(long)]
        user: String,
    },

    /// Update preferences. Unset flags keep their stored value.
    Set {
        #[arg(long)]
        user: String,

        /// `auto`, `quick_delivery`, `marketplace` or `manual`.
        #[arg(long)]
        default_service: Option<ServicePreference>,

        #[arg(long, action = ArgAction::Set)]
        auto_route_fresh: Option<bool>,

        #[arg(long, action = ArgAction::Set)]
        auto_route_pantry: Option<bool>,

        #[arg(long, action = ArgAction::Set)]
        cost_optimization: Option<bool>,

        #[arg(long)]
        instructions: Option<String>,

        #[arg(long)]
        window: Option<String>,

        #[arg(long, requires_all = ["city", "state", "zip"])]
        street: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        zip: Option<String>,

        #[arg(long, requires = "street")]
        apt: Option<String>,

        #[arg(long, requires = "street")]
        country: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Commands::Classify { name } = &cli.command {
        let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
        let c = Classifier::new(cfg.classifier).classify(name);
        println!(
            "{}\tcategory={}\tservice={}\tfreshness={}",
            name, c.category, c.recommended_service, c.freshness_priority
        );
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Classify { .. } => {}
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Route { file, user, json } => {
            let items = load_items(&file)?;
            let pipeline = open_pipeline(&cfg).await?;
            let plan = pipeline.plan(&user, &items).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
        Commands::Checkout { file, user, json } => {
            let items = load_items(&file)?;
            let pipeline = open_pipeline(&cfg).await?;
            let summary = pipeline.checkout(&user, &items).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_checkout(&summary);
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let pipeline = open_pipeline(&cfg).await?;
            let report =
                catalog::import_csv(pipeline.store().as_ref(), pipeline.links(), &text).await?;
            println!("Imported {} products, {} failed.", report.imported, report.failed);
            for error in &report.errors {
                println!("  {}", error);
            }
        }
        Commands::Map {
            ingredient,
            marketplace_id,
            confidence,
        } => {
            catalog::validate_marketplace_id(&marketplace_id)?;
            let store = open_store(&cfg).await?;
            let Some(product) = store.find_product_by_marketplace_id(&marketplace_id).await? else {
                bail!("No product with marketplace id {}. Import it first.", marketplace_id);
            };
            ProductMatcher::new(store)
                .add_mapping(&ingredient, &product.id, confidence)
                .await?;
            println!("Mapped '{}' → {} ({})", ingredient, product.name, marketplace_id);
        }
        Commands::Rule {
            ingredient,
            category,
            service,
            freshness,
            confidence,
        } => {
            let freshness = freshness.unwrap_or_else(|| category.freshness_priority());
            let rule = RoutingRule::new(&ingredient, category, service, freshness, confidence)?;
            let store = open_store(&cfg).await?;
            store.upsert_routing_rule(&rule).await?;
            println!(
                "Rule saved: '{}' → {} ({}, freshness {})",
                rule.ingredient_name, rule.recommended_service, rule.category, freshness
            );
        }
        Commands::Prefs { action } => run_prefs(&cfg, action).await?,
        Commands::Cart { user } => {
            let pipeline = open_pipeline(&cfg).await?;
            let items = pipeline.cart().list(&user).await?;
            if items.is_empty() {
                println!("Cart is empty.");
            }
            for item in items {
                let service = item
                    .delivery_service
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{} {} {}\t{}\t{}\t{}",
                    item.quantity, item.unit, item.ingredient_name, item.product_name, service,
                    item.product_url
                );
            }
        }
        Commands::Search {
            term,
            category,
            limit,
        } => {
            let store = open_store(&cfg).await?;
            let limit = limit.unwrap_or(cfg.matcher.limit);
            let products = store
                .search_products(&term, category.as_deref(), limit)
                .await?;
            if products.is_empty() {
                println!("No products found.");
            }
            for (i, p) in products.iter().enumerate() {
                let price = p
                    .price
                    .map(|p| format!("${:.2}", p))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}. {} [{}] {} (popularity {})",
                    i + 1,
                    p.name,
                    p.marketplace_id.as_deref().unwrap_or("-"),
                    price,
                    p.popularity_score
                );
            }
        }
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn Store>> {
    Ok(Arc::new(SqliteStore::open(cfg).await?))
}

async fn open_pipeline(cfg: &Config) -> Result<Pipeline> {
    Pipeline::new(cfg, open_store(cfg).await?)
}

fn load_items(path: &Path) -> Result<Vec<GroceryItem>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read grocery list: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse grocery list: {}", path.display()))
}

async fn run_prefs(cfg: &Config, action: PrefsAction) -> Result<()> {
    let pipeline = open_pipeline(cfg).await?;
    match action {
        PrefsAction::Show { user } => {
            let prefs = pipeline.preferences(&user).await;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
        PrefsAction::Set {
            user,
            default_service,
            auto_route_fresh,
            auto_route_pantry,
            cost_optimization,
            instructions,
            window,
            street,
            city,
            state,
            zip,
            apt,
            country,
        } => {
            let mut prefs = pipeline.preferences(&user).await;
            if let Some(v) = default_service {
                prefs.default_service = v;
            }
            if let Some(v) = auto_route_fresh {
                prefs.auto_route_fresh_items = v;
            }
            if let Some(v) = auto_route_pantry {
                prefs.auto_route_pantry_items = v;
            }
            if let Some(v) = cost_optimization {
                prefs.enable_cost_optimization = v;
            }
            if let Some(v) = instructions {
                prefs.delivery_instructions = v;
            }
            if let Some(v) = window {
                prefs.preferred_delivery_window = v;
            }
            if let Some(street) = street {
                prefs.delivery_address = Some(DeliveryAddress {
                    street,
                    city: city.unwrap_or_default(),
                    state: state.unwrap_or_default(),
                    zip: zip.unwrap_or_default(),
                    apt,
                    country,
                });
            }
            pipeline.store().save_preferences(&prefs).await?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
    }
    Ok(())
}

fn print_plan(plan: &RoutingPlan) {
    for service in [
        DeliveryService::QuickDelivery,
        DeliveryService::Marketplace,
        DeliveryService::Manual,
    ] {
        let items = plan.items_for(service);
        if items.is_empty() {
            continue;
        }
        println!("{} ({} items)", service.display_name(), items.len());
        for routed in items {
            println!(
                "  {}\t{}\tfreshness {}\tconfidence {:.1}\t{}",
                routed.item.name,
                routed.category,
                routed.freshness_priority,
                routed.confidence_score,
                routed.reasoning
            );
        }
    }
}

fn print_checkout(summary: &CheckoutSummary) {
    print_plan(&summary.plan);
    println!();

    if let Some(link) = &summary.quick_delivery {
        println!("Quick delivery list: {}", link.url);
    }
    if let Some(marketplace) = &summary.marketplace {
        if let Some(cart_url) = &marketplace.result.cart_url {
            println!(
                "Marketplace cart ({} products): {}",
                marketplace.result.mapped_items.len(),
                cart_url
            );
        }
        if marketplace.cart.failed > 0 {
            println!(
                "  {} of {} cart rows could not be saved",
                marketplace.cart.failed,
                marketplace.cart.inserted + marketplace.cart.failed
            );
        }
        for item in &marketplace.result.unmapped_items {
            println!("  Search: {} → {}", item.ingredient, item.search_url);
        }
    }
    if let Some(manual) = &summary.manual {
        println!("Choose a service for:");
        for item in &manual.unmapped_items {
            println!("  {} → {}", item.ingredient, item.search_url);
        }
    }
}
