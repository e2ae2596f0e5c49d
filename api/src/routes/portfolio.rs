use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use domain::{CreatePortfolioItemRequest, PortfolioItemView, PortfolioSummary};
use uuid::Uuid;

use crate::{
    config::VALUATION_CURRENCY,
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portfolio", get(get_portfolio).post(add_portfolio_item))
        .route("/portfolio/:item_id", delete(delete_portfolio_item))
}

async fn add_portfolio_item(
    State(state): State<AppState>,
    Json(payload): Json<CreatePortfolioItemRequest>,
) -> ApiResult<(StatusCode, Json<PortfolioItemView>)> {
    let item = state.portfolio.add(payload).await?;
    tracing::info!(item_id = %item.id, coin_id = %item.coin_id, "portfolio item added");
    Ok((StatusCode::CREATED, Json(PortfolioItemView::from(&item))))
}

/// Values holdings against the cached USD listing, whatever the default
/// listing currency is.
async fn get_portfolio(State(state): State<AppState>) -> ApiResult<Json<PortfolioSummary>> {
    let market = state.market_cache.get(VALUATION_CURRENCY);
    if market.is_empty() {
        return Err(ApiError::Unavailable(format!(
            "Market data ({}) is currently unavailable for portfolio calculation. Please try again shortly.",
            VALUATION_CURRENCY.to_uppercase()
        )));
    }

    let items = state.portfolio.list().await;
    Ok(Json(::portfolio::summarize(&items, &market)))
}

async fn delete_portfolio_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<StatusCode> {
    // Anything that is not a UUID cannot name an item.
    let id = Uuid::parse_str(&item_id)
        .map_err(|_| ApiError::NotFound("Portfolio item not found".into()))?;
    state.portfolio.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
