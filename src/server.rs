//! JSON HTTP API over the checkout pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/route` | Route a grocery list for a user |
//! | `POST` | `/checkout` | Route, resolve, add to cart and build links |
//! | `GET`  | `/products/search` | Catalog search (`q`, `category`, `limit`) |
//! | `GET`  | `/cart/{user_id}` | A user's cart, newest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "grocery list is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). All origins,
//! methods and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{CartItem, GroceryItem, Product, RoutingPlan};
use crate::pipeline::{CheckoutSummary, Pipeline};
use crate::store::sqlite::SqliteStore;

const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    default_limit: usize,
}

/// Open the configured store and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(config).await?;
    let pipeline = Pipeline::new(config, Arc::new(store))?;
    let app = router(Arc::new(pipeline), config.matcher.limit);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "basket server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(pipeline: Arc<Pipeline>, default_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/route", post(handle_route))
        .route("/checkout", post(handle_checkout))
        .route("/products/search", get(handle_search))
        .route("/cart/{user_id}", get(handle_cart))
        .layer(cors)
        .with_state(AppState {
            pipeline,
            default_limit,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        bad_request(err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /route, POST /checkout ============

#[derive(Deserialize)]
struct GroceryRequest {
    user_id: String,
    items: Vec<GroceryItem>,
}

fn require_user(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    Ok(())
}

async fn handle_route(
    State(state): State<AppState>,
    Json(req): Json<GroceryRequest>,
) -> Result<Json<RoutingPlan>, AppError> {
    require_user(&req.user_id)?;
    let plan = state.pipeline.plan(&req.user_id, &req.items).await?;
    Ok(Json(plan))
}

async fn handle_checkout(
    State(state): State<AppState>,
    Json(req): Json<GroceryRequest>,
) -> Result<Json<CheckoutSummary>, AppError> {
    require_user(&req.user_id)?;
    let summary = state.pipeline.checkout(&req.user_id, &req.items).await?;
    Ok(Json(summary))
}

// ============ GET /products/search ============

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    products: Vec<Product>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    if query.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let limit = query
        .limit
        .unwrap_or(state.default_limit)
        .clamp(1, MAX_SEARCH_LIMIT);
    let products = state
        .pipeline
        .store()
        .search_products(&query.q, query.category.as_deref(), limit)
        .await
        .map_err(internal)?;
    Ok(Json(SearchResponse { products }))
}

// ============ GET /cart/{user_id} ============

#[derive(Serialize)]
struct CartResponse {
    items: Vec<CartItem>,
}

async fn handle_cart(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, AppError> {
    let items = state.pipeline.cart().list(&user_id).await.map_err(internal)?;
    Ok(Json(CartResponse { items }))
}
