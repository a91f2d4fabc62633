//! # PriceWatch Worker
//!
//! Scrapes every tracked product once at startup and then every
//! `SCRAPE_INTERVAL_SECS` (default one hour), recording price changes and
//! sending alerts when a target price is reached.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo run -p pricewatch-worker
//! ```

use pricewatch_shared::{
    db::pool::{close_pool, create_pool, DatabaseConfig},
    notify::LogNotifier,
    scraper::Scraper,
};
use pricewatch_worker::{config::WorkerConfig, scan::ProductScanner, scheduler::Scheduler};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pricewatch_worker=debug,pricewatch_shared=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "PriceWatch Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = WorkerConfig::from_env()?;

    let pool = create_pool(DatabaseConfig::new(
        config.database_url.clone(),
        config.max_connections,
    ))
    .await?;

    let scanner = ProductScanner::new(
        pool.clone(),
        Scraper::http(&config.fetcher)?,
        Arc::new(LogNotifier),
    );
    let scheduler = Scheduler::new(scanner, config.scrape_interval);

    tokio::spawn(cancel_on_signal(scheduler.shutdown_token()));

    scheduler.run().await;

    close_pool(pool).await;
    tracing::info!("Worker stopped");

    Ok(())
}

/// Cancels `token` on Ctrl-C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current product");
    token.cancel();
}
