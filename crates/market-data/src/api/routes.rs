//! Axum route definitions for the feed API.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{self, FeedApiState};

/// Create all feed routes.
///
/// # Routes
///
/// - `GET /api/health` - Uptime, subscriber count, request budgets
/// - `GET /api/symbols` - Enriched view of every loaded symbol
/// - `GET /api/symbols/:symbol` - One enriched view
/// - `POST /api/symbols/:symbol/reload` - Re-read the baseline document
/// - `GET /api/extra-options` - Nearest call/put pairs around a price
pub fn feed_routes(state: Arc<FeedApiState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/symbols", get(handlers::list_symbols))
        .route("/api/symbols/:symbol", get(handlers::get_symbol))
        .route("/api/symbols/:symbol/reload", post(handlers::reload_symbol))
        .route("/api/extra-options", get(handlers::extra_options))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
