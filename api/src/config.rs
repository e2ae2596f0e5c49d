use std::{env, fmt, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_API_BASE: &str = "https://api.coingecko.com/api/";
/// Portfolio entry prices are recorded in USD, so holdings are always
/// valued against the USD listing.
pub const VALUATION_CURRENCY: &str = "usd";
const DEV_FRONTEND_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

#[derive(Clone)]
pub struct AppConfig {
    pub coingecko_api_key: String,
    pub coingecko_api_base: String,
    pub frontend_origins: Vec<String>,
    /// Lowercase, deduplicated, always contains [`VALUATION_CURRENCY`]. The
    /// first entry is the default listing currency.
    pub supported_currencies: Vec<String>,
    pub refresh_interval: Duration,
    pub refresh_currency_delay: Duration,
    pub upstream_timeout: Duration,
    pub port: u16,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("coingecko_api_key", &"<redacted>")
            .field("coingecko_api_base", &self.coingecko_api_base)
            .field("frontend_origins", &self.frontend_origins)
            .field("supported_currencies", &self.supported_currencies)
            .field("refresh_interval", &self.refresh_interval)
            .field("refresh_currency_delay", &self.refresh_currency_delay)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let coingecko_api_key = non_empty(&lookup, "COINGECKO_API_KEY")
            .or_else(|| non_empty(&lookup, "API_COINGECKO"))
            .context("COINGECKO_API_KEY must be set for API server")?;

        let mut coingecko_api_base =
            non_empty(&lookup, "COINGECKO_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        if !coingecko_api_base.ends_with('/') {
            coingecko_api_base.push('/');
        }

        let supported_currencies = parse_currencies(&lookup);
        if !supported_currencies.iter().any(|c| c == VALUATION_CURRENCY) {
            anyhow::bail!(
                "SUPPORTED_CURRENCIES must include {VALUATION_CURRENCY}, portfolio valuation depends on it"
            );
        }

        Ok(Self {
            coingecko_api_key,
            coingecko_api_base,
            frontend_origins: parse_origins(&lookup),
            supported_currencies,
            refresh_interval: parse_duration_seconds(&lookup, "MARKET_REFRESH_INTERVAL_SECS", 60)?,
            refresh_currency_delay: parse_duration_seconds(
                &lookup,
                "MARKET_REFRESH_CURRENCY_DELAY_SECS",
                2,
            )?,
            upstream_timeout: parse_duration_seconds(&lookup, "UPSTREAM_TIMEOUT_SECS", 10)?,
            port: lookup("PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
        })
    }

    pub fn default_currency(&self) -> &str {
        &self.supported_currencies[0]
    }

    pub fn is_supported_currency(&self, currency: &str) -> bool {
        self.supported_currencies
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(currency.trim()))
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_origins<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let configured = lookup("FRONTEND_ORIGINS")
        .or_else(|| lookup("FRONTEND_URL"))
        .map(|raw| split_list(&raw))
        .unwrap_or_default();

    let mut origins: Vec<String> = DEV_FRONTEND_ORIGINS.iter().map(|o| o.to_string()).collect();
    for origin in configured {
        let origin = origin.trim_end_matches('/').to_string();
        if !origins.contains(&origin) {
            origins.push(origin);
        }
    }
    origins
}

fn parse_currencies<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut currencies: Vec<String> = Vec::new();
    for currency in lookup("SUPPORTED_CURRENCIES")
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
    {
        let currency = currency.to_lowercase();
        if !currencies.contains(&currency) {
            currencies.push(currency);
        }
    }
    if currencies.is_empty() {
        currencies.push("usd".to_string());
    }
    currencies
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Whole seconds, at least 1. Unset falls back to `default`; anything
/// unparsable is an error.
fn parse_duration_seconds<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(Duration::from_secs(default));
    };
    let seconds = raw
        .parse::<u64>()
        .with_context(|| format!("{key} must be a whole number of seconds"))?;
    if seconds == 0 {
        anyhow::bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(seconds))
}
