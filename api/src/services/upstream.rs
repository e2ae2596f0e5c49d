use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use domain::{CoinDetail, MarketSnapshot};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, Response, StatusCode, Url,
};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";
const MARKETS_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream session not initialized")]
    SessionNotInitialized,
    #[error("invalid upstream configuration: {0}")]
    Config(String),
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("failed to decode upstream response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Read side of the market-data provider. Every outbound call in the
/// backend goes through an implementation of this trait.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Top assets by market cap for `currency`. Unsupported currencies fall
    /// back to the default one instead of failing.
    async fn fetch_markets(&self, currency: &str) -> Result<MarketSnapshot, UpstreamError>;
    /// Full detail for one asset, memoized per id for the process lifetime.
    async fn fetch_coin_details(&self, asset_id: &str) -> Result<CoinDetail, UpstreamError>;
}

/// CoinGecko client.
///
/// The HTTP session is explicit: nothing can be fetched between
/// construction and [`CoingeckoClient::initialize_session`], nor after
/// [`CoingeckoClient::close_session`].
pub struct CoingeckoClient {
    base_url: Url,
    api_key: String,
    timeout: Duration,
    supported_currencies: Vec<String>,
    session: RwLock<Option<Client>>,
    // Successful lookups are never evicted; failed ones are removed again.
    coin_details: Mutex<HashMap<String, Arc<OnceCell<CoinDetail>>>>,
}

impl CoingeckoClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        supported_currencies: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| UpstreamError::Config(format!("base url {base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Config(format!(
                "base url {base_url} cannot be a base"
            )));
        }
        let supported_currencies = supported_currencies
            .into_iter()
            .map(|currency| currency.trim().to_lowercase())
            .filter(|currency| !currency.is_empty())
            .collect::<Vec<_>>();
        if supported_currencies.is_empty() {
            return Err(UpstreamError::Config(
                "at least one supported currency is required".to_string(),
            ));
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            timeout,
            supported_currencies,
            session: RwLock::new(None),
            coin_details: Mutex::new(HashMap::new()),
        })
    }

    pub async fn initialize_session(&self) -> Result<(), UpstreamError> {
        let mut session = self.session.write().await;
        if session.is_some() {
            return Ok(());
        }
        info!(base_url = %self.base_url, "initializing upstream session");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| UpstreamError::Config("api key is not a valid header value".into()))?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|err| UpstreamError::Config(format!("http client: {err}")))?;
        *session = Some(client);
        Ok(())
    }

    pub async fn close_session(&self) {
        if self.session.write().await.take().is_some() {
            info!(base_url = %self.base_url, "closed upstream session");
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.supported_currencies[0]
    }

    fn resolve_currency(&self, requested: &str) -> String {
        let lower = requested.trim().to_lowercase();
        if self.supported_currencies.contains(&lower) {
            lower
        } else {
            warn!(
                requested,
                fallback = self.default_currency(),
                "unsupported currency requested, using default"
            );
            self.default_currency().to_string()
        }
    }

    async fn session(&self) -> Result<Client, UpstreamError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(UpstreamError::SessionNotInitialized)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Drops the slot for `asset_id` if it still points at `cell` and
    /// nothing was stored in it, so failing ids do not pile up.
    async fn forget_failed_lookup(&self, asset_id: &str, cell: &Arc<OnceCell<CoinDetail>>) {
        let mut memo = self.coin_details.lock().await;
        let unused = memo
            .get(asset_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, cell) && slot.get().is_none());
        if unused {
            memo.remove(asset_id);
        }
    }

    async fn request_coin_details(&self, asset_id: &str) -> Result<CoinDetail, UpstreamError> {
        let session = self.session().await?;
        let url = self.endpoint(&["v3", "coins", asset_id]);
        let response = session
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;
        let detail = ensure_success(response)?
            .json::<CoinDetail>()
            .await
            .map_err(UpstreamError::Decode)?;
        debug!(asset_id, "fetched coin details");
        Ok(detail)
    }
}

#[async_trait]
impl MarketDataClient for CoingeckoClient {
    async fn fetch_markets(&self, currency: &str) -> Result<MarketSnapshot, UpstreamError> {
        let currency = self.resolve_currency(currency);
        let session = self.session().await?;
        let per_page = MARKETS_PAGE_SIZE.to_string();
        let response = session
            .get(self.endpoint(&["v3", "coins", "markets"]))
            .query(&[
                ("vs_currency", currency.as_str()),
                ("order", "market_cap_desc"),
                ("per_page", per_page.as_str()),
                ("page", "1"),
                ("sparkline", "false"),
                ("price_change_percentage", "24h"),
            ])
            .send()
            .await
            .map_err(UpstreamError::Transport)?;
        debug!(%currency, status = %response.status(), "markets response");
        ensure_success(response)?
            .json::<MarketSnapshot>()
            .await
            .map_err(UpstreamError::Decode)
    }

    async fn fetch_coin_details(&self, asset_id: &str) -> Result<CoinDetail, UpstreamError> {
        let cell = self
            .coin_details
            .lock()
            .await
            .entry(asset_id.to_string())
            .or_default()
            .clone();
        if let Some(detail) = cell.get() {
            metrics::counter!("coin_detail_cache_hits_total").increment(1);
            return Ok(detail.clone());
        }
        // Concurrent callers for the same id share one request.
        match cell.get_or_try_init(|| self.request_coin_details(asset_id)).await {
            Ok(detail) => Ok(detail.clone()),
            Err(err) => {
                self.forget_failed_lookup(asset_id, &cell).await;
                Err(err)
            }
        }
    }
}

fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(UpstreamError::Status {
            status,
            url: response.url().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    use axum::{
        extract::{Path, Query, State},
        http::HeaderMap as AxumHeaderMap,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct FakeProvider {
        market_calls: Arc<AtomicUsize>,
        detail_calls: Arc<AtomicUsize>,
        fail_details: Arc<AtomicBool>,
        last_query: Arc<StdMutex<HashMap<String, String>>>,
    }

    async fn fake_markets(
        State(fake): State<FakeProvider>,
        headers: AxumHeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        fake.market_calls.fetch_add(1, Ordering::SeqCst);
        if headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) != Some("test-key") {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        let currency = query.get("vs_currency").cloned().unwrap_or_default();
        *fake.last_query.lock().unwrap() = query;
        Json(serde_json::json!([
            { "id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 65000.0, "vs": currency },
            { "id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": 3200.0 }
        ]))
        .into_response()
    }

    async fn fake_coin(
        State(fake): State<FakeProvider>,
        Path(id): Path<String>,
    ) -> axum::response::Response {
        fake.detail_calls.fetch_add(1, Ordering::SeqCst);
        if fake.fail_details.load(Ordering::SeqCst) {
            return axum::http::StatusCode::TOO_MANY_REQUESTS.into_response();
        }
        Json(serde_json::json!({ "id": id, "market_data": { "current_price": { "usd": 1.0 } } }))
            .into_response()
    }

    async fn spawn_fake(fake: FakeProvider) -> String {
        let app = Router::new()
            .route("/api/v3/coins/markets", get(fake_markets))
            .route("/api/v3/coins/:id", get(fake_coin))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake provider");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake provider");
        });
        format!("http://{addr}/api/")
    }

    async fn connected_client(fake: FakeProvider) -> CoingeckoClient {
        let base = spawn_fake(fake).await;
        let client = CoingeckoClient::new(
            &base,
            "test-key",
            vec!["usd".into(), "eur".into()],
            Duration::from_secs(5),
        )
        .expect("client");
        client.initialize_session().await.expect("session");
        client
    }

    #[tokio::test]
    async fn markets_request_carries_listing_parameters() {
        let fake = FakeProvider::default();
        let client = connected_client(fake.clone()).await;

        let snapshot = client.fetch_markets("EUR").await.expect("markets");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "bitcoin");
        assert_eq!(snapshot[0].current_price, Some(65000.0));

        let query = fake.last_query.lock().unwrap().clone();
        assert_eq!(query["vs_currency"], "eur");
        assert_eq!(query["order"], "market_cap_desc");
        assert_eq!(query["per_page"], "100");
        assert_eq!(query["page"], "1");
        assert_eq!(query["sparkline"], "false");
        assert_eq!(query["price_change_percentage"], "24h");
    }

    #[tokio::test]
    async fn unsupported_currency_falls_back_to_default() {
        let fake = FakeProvider::default();
        let client = connected_client(fake.clone()).await;

        let snapshot = client.fetch_markets("doge").await.expect("markets");
        assert!(!snapshot.is_empty());
        assert_eq!(fake.last_query.lock().unwrap()["vs_currency"], "usd");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let fake = FakeProvider::default();
        let base = spawn_fake(fake).await;
        let client =
            CoingeckoClient::new(&base, "wrong-key", vec!["usd".into()], Duration::from_secs(5))
                .expect("client");
        client.initialize_session().await.expect("session");

        let err = client.fetch_markets("usd").await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
    }

    #[tokio::test]
    async fn coin_details_are_fetched_once_per_id() {
        let fake = FakeProvider::default();
        let client = connected_client(fake.clone()).await;

        let first = client.fetch_coin_details("bitcoin").await.expect("detail");
        let second = client.fetch_coin_details("bitcoin").await.expect("detail");
        assert_eq!(first, second);
        assert_eq!(fake.detail_calls.load(Ordering::SeqCst), 1);

        client.fetch_coin_details("ethereum").await.expect("detail");
        assert_eq!(fake.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_coin_details_are_not_memoized() {
        let fake = FakeProvider::default();
        let client = connected_client(fake.clone()).await;

        fake.fail_details.store(true, Ordering::SeqCst);
        assert!(client.fetch_coin_details("solana").await.is_err());

        fake.fail_details.store(false, Ordering::SeqCst);
        let detail = client.fetch_coin_details("solana").await.expect("retry");
        assert_eq!(detail["id"], "solana");
        client.fetch_coin_details("solana").await.expect("cached");
        assert_eq!(fake.detail_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_lookups_leave_no_memo_entries() {
        let fake = FakeProvider::default();
        fake.fail_details.store(true, Ordering::SeqCst);
        let client = connected_client(fake.clone()).await;

        for i in 0..50 {
            assert!(client.fetch_coin_details(&format!("bogus-{i}")).await.is_err());
        }
        assert!(client.coin_details.lock().await.is_empty());

        fake.fail_details.store(false, Ordering::SeqCst);
        client.fetch_coin_details("bitcoin").await.expect("detail");
        assert_eq!(client.coin_details.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn session_lifecycle_is_idempotent() {
        let client = CoingeckoClient::new(
            "http://127.0.0.1:9/api/",
            "k",
            vec!["usd".into()],
            Duration::from_secs(1),
        )
        .expect("client");

        client.close_session().await;
        assert!(matches!(
            client.fetch_markets("usd").await,
            Err(UpstreamError::SessionNotInitialized)
        ));

        client.initialize_session().await.expect("first init");
        client.initialize_session().await.expect("second init");
        client.close_session().await;
        client.close_session().await;
        assert!(matches!(
            client.fetch_coin_details("bitcoin").await,
            Err(UpstreamError::SessionNotInitialized)
        ));
    }

    #[test]
    fn endpoint_joins_onto_base_path() {
        let client = CoingeckoClient::new(
            "https://api.coingecko.com/api",
            "k",
            vec![" USD ".into()],
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(client.default_currency(), "usd");
        assert_eq!(
            client.endpoint(&["v3", "coins", "markets"]).as_str(),
            "https://api.coingecko.com/api/v3/coins/markets"
        );
        assert_eq!(
            client.endpoint(&["v3", "coins", "a/b"]).as_str(),
            "https://api.coingecko.com/api/v3/coins/a%2Fb"
        );
    }

    #[test]
    fn rejects_empty_currency_set() {
        assert!(matches!(
            CoingeckoClient::new("https://x.test/api/", "k", vec![], Duration::from_secs(1)),
            Err(UpstreamError::Config(_))
        ));
    }
}
