use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Ready once every supported currency has a published listing.
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<BTreeMap<String, usize>>) {
    let sizes: BTreeMap<String, usize> = state
        .config
        .supported_currencies
        .iter()
        .map(|currency| (currency.clone(), state.market_cache.get(currency).len()))
        .collect();
    let status = if sizes.values().all(|size| *size > 0) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(sizes))
}
