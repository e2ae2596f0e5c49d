use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the provider's `/coins/markets` listing.
///
/// Only `id` and `current_price` are interpreted by the backend; the typed
/// fields below are the ones the frontend renders, everything else the
/// provider sends is carried through untouched in `extra`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MarketCoin {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub high_24h: Option<f64>,
    #[serde(default)]
    pub low_24h: Option<f64>,
    #[serde(default)]
    pub price_change_24h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MarketCoin {
    /// Minimal row, mostly useful for fixtures.
    pub fn new(id: impl Into<String>, current_price: Option<f64>) -> Self {
        let id = id.into();
        Self {
            symbol: id.chars().take(3).collect(),
            name: id.clone(),
            id,
            image: None,
            current_price,
            market_cap: None,
            market_cap_rank: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_24h: None,
            price_change_percentage_24h: None,
            last_updated: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Market listing for one quote currency, in provider order (market cap desc).
pub type MarketSnapshot = Vec<MarketCoin>;

/// Full `/coins/{id}` payload. The shape is large and provider-defined, so it
/// is passed through as raw JSON.
pub type CoinDetail = serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortfolioItem {
    pub id: Uuid,
    pub coin_id: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreatePortfolioItemRequest {
    pub coin_id: String,
    pub quantity: f64,
    pub entry_price: f64,
}

impl CreatePortfolioItemRequest {
    /// Checks the request and returns a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.coin_id.trim().is_empty() {
            return Err("coin_id must not be empty".to_string());
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err("quantity must be greater than 0".to_string());
        }
        if !self.entry_price.is_finite() || self.entry_price < 0.0 {
            return Err("entry_price must be greater than or equal to 0".to_string());
        }
        Ok(())
    }
}

/// A holding plus its valuation against the latest market snapshot.
/// Valuation fields are `None` when the coin is not in the snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortfolioItemView {
    pub id: Uuid,
    pub coin_id: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub current_value: Option<f64>,
    pub profit_loss: Option<f64>,
    pub profit_loss_percent: Option<f64>,
}

impl From<&PortfolioItem> for PortfolioItemView {
    fn from(item: &PortfolioItem) -> Self {
        Self {
            id: item.id,
            coin_id: item.coin_id.clone(),
            quantity: item.quantity,
            entry_price: item.entry_price,
            current_price: None,
            current_value: None,
            profit_loss: None,
            profit_loss_percent: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PortfolioSummary {
    pub total_entry_value: f64,
    pub total_current_value: f64,
    pub total_profit_loss: f64,
    pub total_profit_loss_percent: f64,
    pub items: Vec<PortfolioItemView>,
}
