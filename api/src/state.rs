use std::sync::Arc;

use portfolio::PortfolioStore;

use crate::{
    config::AppConfig,
    services::{MarketCache, MarketDataClient},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Read-only from handlers; the refresher is the only writer.
    pub market_cache: MarketCache,
    pub market_data: Arc<dyn MarketDataClient>,
    pub portfolio: Arc<dyn PortfolioStore>,
}

// Ensure critical dependencies uphold Send/Sync for Axum state usage.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    MarketCache: Send + Sync + 'static,
    dyn MarketDataClient: Send + Sync,
    dyn PortfolioStore: Send + Sync,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
