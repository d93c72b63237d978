//! HTTP request handlers for the feed API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

use crate::api::models::*;
use crate::chain::{nearest_pairs, ExtraOptions, OptionChainSource};
use crate::feed::MarketFeed;
use crate::types::EnrichedView;

/// Upper bound on pairs per side for one query
const MAX_PAIR_COUNT: usize = 50;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// Shared state for feed API handlers.
pub struct FeedApiState {
    pub feed: MarketFeed,
    pub chain: Arc<dyn OptionChainSource>,
    /// Used when `/api/extra-options` names no symbol
    pub default_symbol: String,
    pub default_count: usize,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<FeedApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.feed.uptime().as_secs(),
        clients: state.feed.subscriber_count(),
        rate_limits: state.feed.rate_limits(),
        symbols: state.feed.loaded_symbols(),
    })
}

/// GET /api/symbols
pub async fn list_symbols(
    State(state): State<Arc<FeedApiState>>,
) -> Json<ApiResponse<BTreeMap<String, EnrichedView>>> {
    Json(ApiResponse::success(state.feed.enriched_all()))
}

/// GET /api/symbols/:symbol
pub async fn get_symbol(
    State(state): State<Arc<FeedApiState>>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<EnrichedView>>, ApiError> {
    state
        .feed
        .enriched(&symbol)
        .map(|view| Json(ApiResponse::success(view)))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Symbol not loaded: {}", symbol)))
}

/// POST /api/symbols/:symbol/reload
pub async fn reload_symbol(
    State(state): State<Arc<FeedApiState>>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<ReloadResponse>>, ApiError> {
    if !state.feed.reload_symbol(&symbol).await {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No baseline document for {}", symbol),
        ));
    }

    info!(%symbol, "Baseline document reloaded");
    Ok(Json(ApiResponse::success(ReloadResponse {
        symbol,
        reloaded: true,
    })))
}

/// GET /api/extra-options?symbol=&currentPrice=&count=
pub async fn extra_options(
    State(state): State<Arc<FeedApiState>>,
    Query(params): Query<ExtraOptionsParams>,
) -> Result<Json<ApiResponse<ExtraOptions>>, ApiError> {
    let price = params
        .current_price
        .as_deref()
        .and_then(|p| p.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid currentPrice parameter"))?;

    let symbol = params
        .symbol
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.default_symbol.clone());
    let count = params
        .count
        .unwrap_or(state.default_count)
        .clamp(1, MAX_PAIR_COUNT);

    let contracts = state.chain.contracts(&symbol).await.map_err(|e| {
        error!(%symbol, error = %e, "Option chain query failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(ApiResponse::success(nearest_pairs(&contracts, price, count))))
}
