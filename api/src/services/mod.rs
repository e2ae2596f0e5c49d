pub mod market_cache;
pub mod refresher;
pub mod upstream;

pub use market_cache::MarketCache;
pub use refresher::{MarketRefresher, RefreshHandle, RefreshSettings};
pub use upstream::{CoingeckoClient, MarketDataClient, UpstreamError};
