use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset. Refresh-cycle chatter stays at debug.
const DEFAULT_DIRECTIVES: &str = "info,api=info,portfolio=info,tower_http=info,reqwest=warn";

/// Installs the global subscriber: one JSON object per event, request and
/// refresh spans attached.
pub fn init_tracing() -> anyhow::Result<()> {
    Registry::default()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true),
        )
        .try_init()?;

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}
