use std::sync::Arc;

use anyhow::{Context, Result};
use portfolio::InMemoryPortfolioStore;
use tracing::{error, info};

use crate::{
    config::AppConfig,
    services::{CoingeckoClient, MarketCache, MarketRefresher, RefreshHandle, RefreshSettings},
    state::AppState,
};

/// Everything that has to be torn down when the process stops.
pub struct Backend {
    pub state: AppState,
    client: Arc<CoingeckoClient>,
    refresher: RefreshHandle,
}

pub fn build_client(config: &AppConfig) -> Result<Arc<CoingeckoClient>> {
    let client = CoingeckoClient::new(
        &config.coingecko_api_base,
        config.coingecko_api_key.clone(),
        config.supported_currencies.clone(),
        config.upstream_timeout,
    )
    .context("failed to configure coingecko client")?;
    Ok(Arc::new(client))
}

pub fn refresh_settings(config: &AppConfig) -> RefreshSettings {
    RefreshSettings {
        currencies: config.supported_currencies.clone(),
        interval: config.refresh_interval,
        currency_delay: config.refresh_currency_delay,
    }
}

/// Opens the upstream session and schedules the market refresher. Must
/// complete before the listener starts accepting traffic.
pub async fn start(config: &AppConfig) -> Result<Backend> {
    let client = build_client(config)?;
    client
        .initialize_session()
        .await
        .context("failed to open coingecko session")?;
    info!("http client initialized");

    let market_cache = MarketCache::new(&config.supported_currencies);
    let refresher = Arc::new(MarketRefresher::new(
        client.clone(),
        market_cache.clone(),
        refresh_settings(config),
    ))
    .spawn();
    info!("market refresher scheduled");

    Ok(Backend {
        state: AppState {
            config: config.clone(),
            market_cache,
            market_data: client.clone(),
            portfolio: Arc::new(InMemoryPortfolioStore::new()),
        },
        client,
        refresher,
    })
}

impl Backend {
    /// Stops the refresher, then closes the session. The session is closed
    /// even when the refresher task ended abnormally; nothing here returns an
    /// error to the caller.
    pub async fn shutdown(self) {
        info!("cancelling market refresher");
        match self.refresher.shutdown().await {
            Ok(()) => info!("market refresher cancelled"),
            Err(err) => error!(error = %err, "market refresher ended abnormally"),
        }
        self.client.close_session().await;
        info!("http client closed");
    }
}
