use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,tower_http=info";

/// Bunyan-formatted JSON logs on stdout, filtered by `RUST_LOG`.
pub fn init_tracing(name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let formatting = BunyanFormattingLayer::new(name.to_string(), std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(JsonStorageLayer)
        .with(formatting)
        .init();
}
