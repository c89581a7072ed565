//! finsight - finance news insight aggregation and analysis system.
//!
//! Ingests market news into SQLite and drives LLM analysis through a
//! persistent task queue with retries, backoff and crash recovery.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finsight::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "finsight=info"
    } else {
        "finsight=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
