use std::{ops::ControlFlow, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::services::{market_cache::MarketCache, upstream::MarketDataClient};

#[derive(Clone, Debug)]
pub struct RefreshSettings {
    /// Processed in this order on every cycle.
    pub currencies: Vec<String>,
    /// Pause after a full pass over `currencies`.
    pub interval: Duration,
    /// Pause after each currency, bounds the request rate upstream.
    pub currency_delay: Duration,
}

/// Background loop that keeps [`MarketCache`] filled from the provider.
///
/// A failed fetch never clears a currency: the previous listing stays in
/// place until a later cycle succeeds.
pub struct MarketRefresher<C>
where
    C: MarketDataClient + ?Sized + 'static,
{
    client: Arc<C>,
    cache: MarketCache,
    settings: RefreshSettings,
}

impl<C> MarketRefresher<C>
where
    C: MarketDataClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, cache: MarketCache, settings: RefreshSettings) -> Self {
        Self {
            client,
            cache,
            settings,
        }
    }

    pub fn spawn(self: Arc<Self>) -> RefreshHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        RefreshHandle { shutdown, task }
    }

    /// Runs cycles until `shutdown` fires. Cancellation is observed at every
    /// await point, including an in-flight fetch.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            currencies = ?self.settings.currencies,
            interval_secs = self.settings.interval.as_secs(),
            "market refresher started"
        );
        loop {
            if self.run_cycle(&shutdown).await.is_break() {
                break;
            }
            debug!(
                interval_secs = self.settings.interval.as_secs(),
                "market refresh cycle finished"
            );
            if pause(self.settings.interval, &shutdown).await.is_break() {
                break;
            }
        }
        info!("market refresher stopped");
    }

    /// One pass over every configured currency.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> ControlFlow<()> {
        for currency in &self.settings.currencies {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return ControlFlow::Break(()),
                fetched = self.client.fetch_markets(currency) => fetched,
            };
            match fetched {
                Ok(snapshot) => {
                    debug!(%currency, coins = snapshot.len(), "market cache updated");
                    metrics::gauge!("market_snapshot_size", "currency" => currency.clone())
                        .set(snapshot.len() as f64);
                    metrics::counter!("market_refresh_success_total", "currency" => currency.clone())
                        .increment(1);
                    self.cache.set(currency, snapshot);
                }
                Err(err) => {
                    error!(%currency, error = %err, "market refresh failed, keeping previous data");
                    metrics::counter!("market_refresh_failure_total", "currency" => currency.clone())
                        .increment(1);
                }
            }
            if pause(self.settings.currency_delay, shutdown).await.is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

async fn pause(duration: Duration, shutdown: &CancellationToken) -> ControlFlow<()> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => ControlFlow::Break(()),
        _ = sleep(duration) => ControlFlow::Continue(()),
    }
}

/// Owner of a spawned [`MarketRefresher`].
pub struct RefreshHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the loop and waits for it to exit.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.shutdown.cancel();
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
