use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use domain::{CoinDetail, MarketSnapshot};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cryptocurrencies", get(list_cryptocurrencies))
        .route("/cryptocurrency/:coin_id", get(get_cryptocurrency))
}

#[derive(Debug, Deserialize)]
struct MarketQuery {
    vs_currency: Option<String>,
}

/// Served straight from the cache; never waits on the provider.
async fn list_cryptocurrencies(
    State(state): State<AppState>,
    Query(params): Query<MarketQuery>,
) -> ApiResult<Json<Arc<MarketSnapshot>>> {
    let currency = params
        .vs_currency
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_else(|| state.config.default_currency().to_string());
    if !state.config.is_supported_currency(&currency) {
        return Err(ApiError::Validation(format!(
            "vs_currency must be one of: {}",
            state.config.supported_currencies.join(", ")
        )));
    }

    let snapshot = state.market_cache.get(&currency);
    if snapshot.is_empty() {
        return Err(ApiError::Unavailable(format!(
            "Market data for {} is currently unavailable. Please try again shortly.",
            currency.to_uppercase()
        )));
    }
    Ok(Json(snapshot))
}

async fn get_cryptocurrency(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
) -> ApiResult<Json<CoinDetail>> {
    state
        .market_data
        .fetch_coin_details(&coin_id)
        .await
        .map(Json)
        .map_err(|err| ApiError::Upstream(format!("Could not fetch details for {coin_id}: {err}")))
}
