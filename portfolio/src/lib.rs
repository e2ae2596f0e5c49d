use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    CreatePortfolioItemRequest, MarketCoin, PortfolioItem, PortfolioItemView, PortfolioSummary,
};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum PortfolioError {
    #[error("invalid portfolio item: {0}")]
    Validation(String),
    #[error("portfolio item {0} not found")]
    NotFound(Uuid),
}

pub type PortfolioResult<T> = Result<T, PortfolioError>;

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn add(&self, request: CreatePortfolioItemRequest) -> PortfolioResult<PortfolioItem>;
    /// Items in insertion order.
    async fn list(&self) -> Vec<PortfolioItem>;
    async fn remove(&self, id: Uuid) -> PortfolioResult<()>;
}

/// Process-local holdings. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryPortfolioStore {
    items: RwLock<Vec<PortfolioItem>>,
}

impl InMemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortfolioStore for InMemoryPortfolioStore {
    async fn add(&self, request: CreatePortfolioItemRequest) -> PortfolioResult<PortfolioItem> {
        request.validate().map_err(PortfolioError::Validation)?;
        let item = PortfolioItem {
            id: Uuid::new_v4(),
            coin_id: request.coin_id.trim().to_string(),
            quantity: request.quantity,
            entry_price: request.entry_price,
            created_at: Utc::now(),
        };
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    async fn list(&self) -> Vec<PortfolioItem> {
        self.items.read().await.clone()
    }

    async fn remove(&self, id: Uuid) -> PortfolioResult<()> {
        let mut items = self.items.write().await;
        let position = items
            .iter()
            .position(|item| item.id == id)
            .ok_or(PortfolioError::NotFound(id))?;
        items.remove(position);
        Ok(())
    }
}

/// Values every holding against `market` (expected to be the USD listing).
///
/// Holdings whose coin is missing from the listing, or listed without a
/// price, keep `None` valuation fields and count towards the entry total only.
pub fn summarize(items: &[PortfolioItem], market: &[MarketCoin]) -> PortfolioSummary {
    let prices: HashMap<&str, f64> = market
        .iter()
        .filter_map(|coin| coin.current_price.map(|price| (coin.id.as_str(), price)))
        .collect();

    let mut summary = PortfolioSummary::default();
    for item in items {
        let mut view = PortfolioItemView::from(item);
        let entry_value = item.quantity * item.entry_price;
        summary.total_entry_value += entry_value;

        if let Some(&price) = prices.get(item.coin_id.as_str()) {
            let current_value = item.quantity * price;
            let profit_loss = current_value - entry_value;
            view.current_price = Some(price);
            view.current_value = Some(current_value);
            view.profit_loss = Some(profit_loss);
            view.profit_loss_percent = Some(percent_of(profit_loss, entry_value));
            summary.total_current_value += current_value;
        }
        summary.items.push(view);
    }

    summary.total_profit_loss = summary.total_current_value - summary.total_entry_value;
    summary.total_profit_loss_percent =
        percent_of(summary.total_profit_loss, summary.total_entry_value);
    summary
}

// A zero cost basis (airdrops, gifts) has no meaningful percentage.
fn percent_of(delta: f64, base: f64) -> f64 {
    if base > 0.0 {
        delta / base * 100.0
    } else {
        0.0
    }
}
