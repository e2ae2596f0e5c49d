use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use domain::MarketSnapshot;

/// Latest known-good market listing per quote currency.
///
/// Snapshots are published as a fresh `Arc` and never mutated afterwards, so
/// a reader always holds one complete listing. The lock only guards the map
/// slot and is never held across an await point.
#[derive(Clone, Default)]
pub struct MarketCache {
    inner: Arc<RwLock<HashMap<String, Arc<MarketSnapshot>>>>,
}

impl MarketCache {
    /// Tracks `currencies`, each starting out empty.
    pub fn new<I, S>(currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = currencies
            .into_iter()
            .map(|currency| (normalize(currency.as_ref()), Arc::new(MarketSnapshot::new())))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(entries)),
        }
    }

    /// Current listing for `currency`; empty when nothing was published yet.
    pub fn get(&self, currency: &str) -> Arc<MarketSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(currency))
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the listing for `currency` wholesale.
    pub fn set(&self, currency: &str, snapshot: MarketSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(currency), snapshot);
    }

    pub fn currencies(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

fn normalize(currency: &str) -> String {
    currency.trim().to_lowercase()
}
