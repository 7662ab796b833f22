//! # gafx-api — Binary Entry Point
//!
//! Starts the escrow HTTP service and the deadline scheduler.
//! Binds to `PORT` (default 8080).

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::mpsc;

use gafx_api::bootstrap::{bootstrap, restore_escrows};
use gafx_api::state::AppConfig;
use gafx_escrow::DeadlineScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::debug!(?config, "service configuration");

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {e}. /metrics will omit engine counters.");
            None
        }
    };

    // Optional: absent DATABASE_URL means in-memory only.
    let db_pool = gafx_api::db::init_pool(config.database_url.as_deref())
        .await
        .context("database initialization failed")?;

    let port = config.port;
    let (state, ledger) = bootstrap(config, db_pool, prometheus).context("bootstrap failed")?;

    state
        .hydrate_from_db()
        .await
        .map_err(anyhow::Error::msg)
        .context("database hydration failed")?;
    restore_escrows(&state.engine, &ledger);

    // Scheduler changes are written through like request changes.
    let (changes_tx, mut changes_rx) = mpsc::unbounded_channel();
    let scheduler = DeadlineScheduler::new(state.engine.clone()).spawn(Some(changes_tx));
    let persister = {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(order) = changes_rx.recv().await {
                state.persist(&order).await;
            }
        })
    };

    let app = gafx_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("GAFX escrow API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    // The sender is dropped with the scheduler task, which ends the loop.
    if let Err(e) = persister.await {
        tracing::warn!(error = %e, "persistence task ended abnormally");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
