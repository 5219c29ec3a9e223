//! # Basket Router
//!
//! Grocery delivery routing and checkout reconciliation.
//!
//! Basket Router takes a grocery list derived from recipes, decides which
//! fulfillment channel each item should go to (quick delivery for
//! perishables, the marketplace for shelf-stable goods, or a manual
//! choice), resolves marketplace items to catalog products, and builds
//! the checkout artifacts: a shopping-list link, a multi-item cart link
//! and per-item search links for anything left unresolved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │ Grocery list │──▶│   Router   │──▶│   Matcher    │──▶│ Aggregator │
//! │  (recipes)   │   │ rules+kw   │   │ map+search   │   │ dedup+merge│
//! └──────────────┘   └─────┬──────┘   └──────┬───────┘   └─────┬──────┘
//!                          │                 │                 │
//!                          ▼                 ▼                 ▼
//!                    ┌─────────────────────────────┐    ┌────────────┐
//!                    │     Store (SQLite / mem)     │    │ Link maker │
//!                    └─────────────────────────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! basket init                           # create database
//! basket import catalog.csv             # load products
//! basket route list.json --user u1      # preview routing
//! basket checkout list.json --user u1   # full checkout
//! basket serve                          # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Input-validation errors |
//! | [`classifier`] | Keyword category classification |
//! | [`routing`] | Per-item service routing |
//! | [`matcher`] | Ingredient to product resolution |
//! | [`units`] | Unit normalization and conversion |
//! | [`checkout`] | Checkout aggregation |
//! | [`affiliate`] | Tagged marketplace links |
//! | [`quick_delivery`] | Shopping-list client with fallback |
//! | [`cart`] | Cart repository |
//! | [`catalog`] | Catalog CSV import |
//! | [`best_effort`] | Non-fatal side effects |
//! | [`pipeline`] | End-to-end checkout orchestration |
//! | [`store`] | Storage trait and backends |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod affiliate;
pub mod best_effort;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod quick_delivery;
pub mod routing;
pub mod server;
pub mod store;
pub mod units;
