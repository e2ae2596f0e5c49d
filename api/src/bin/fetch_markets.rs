use api::{
    bootstrap,
    config::AppConfig,
    services::{MarketCache, MarketRefresher},
    telemetry,
};
use tokio_util::sync::CancellationToken;

/// Runs a single refresh cycle against the real provider and reports what
/// landed in the cache. Handy for checking an API key.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing()?;
    let config = AppConfig::from_env()?;

    let client = bootstrap::build_client(&config)?;
    client.initialize_session().await?;

    let cache = MarketCache::new(&config.supported_currencies);
    let refresher = MarketRefresher::new(
        client.clone(),
        cache.clone(),
        bootstrap::refresh_settings(&config),
    );
    let _ = refresher.run_cycle(&CancellationToken::new()).await;

    for currency in cache.currencies() {
        let snapshot = cache.get(&currency);
        let top: Vec<&str> = snapshot.iter().take(5).map(|coin| coin.id.as_str()).collect();
        if snapshot.is_empty() {
            tracing::warn!(%currency, "no market data fetched");
        } else {
            tracing::info!(%currency, coins = snapshot.len(), ?top, "market data fetched");
        }
    }

    client.close_session().await;
    Ok(())
}
