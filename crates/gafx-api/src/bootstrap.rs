//! # Service Bootstrap
//!
//! Builds the escrow engine and the application state at startup.
//!
//! ## Bootstrap Sequence
//!
//! 1. **Load Engine Config**: YAML from `ESCROW_CONFIG`, or defaults.
//! 2. **Wire Ports**: in-process ledger, static-rate oracle, system clock.
//! 3. **Build State**: engine, pool, and Prometheus handle on `AppState`.
//!
//! After hydration, [`restore_escrows`] re-locks the escrow of every open
//! order in the in-process ledger, which does not survive restarts.

use std::sync::Arc;

use gafx_core::{SystemClock, ValidationError};
use gafx_escrow::{
    ConfigError, EngineConfig, EscrowEngine, EscrowLedger, InMemoryLedger, StaticRateOracle,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::state::{AppConfig, AppState};

/// Errors during service bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The engine configuration could not be loaded or is invalid.
    #[error("engine configuration: {0}")]
    Config(#[from] ConfigError),

    /// The built-in rate table is malformed.
    #[error("pricing oracle: {0}")]
    Oracle(#[from] ValidationError),
}

/// Load the engine configuration named by `path`, or the defaults.
pub fn load_engine_config(path: Option<&str>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = EngineConfig::from_yaml_file(path)?;
            tracing::info!(path, "loaded engine configuration");
            Ok(config)
        }
        None => {
            tracing::info!("ESCROW_CONFIG not set, using default engine configuration");
            Ok(EngineConfig::default())
        }
    }
}

/// Build the application state and return the in-process ledger with it.
pub fn bootstrap(
    config: AppConfig,
    db_pool: Option<sqlx::PgPool>,
    prometheus: Option<PrometheusHandle>,
) -> Result<(AppState, Arc<InMemoryLedger>), BootstrapError> {
    let engine_config = load_engine_config(config.escrow_config.as_deref())?;

    let clock = Arc::new(SystemClock);
    let ledger = Arc::new(InMemoryLedger::unmetered());
    let oracle = Arc::new(StaticRateOracle::with_default_rates(clock.clone())?);
    let engine = EscrowEngine::new(engine_config, ledger.clone(), oracle, clock)?;

    log_banner(&config, &engine, ledger.as_ref());

    let state = AppState::new(engine, config)
        .with_db_pool(db_pool)
        .with_prometheus(prometheus);
    Ok((state, ledger))
}

/// Re-lock the escrow of every non-terminal order. Returns how many were
/// restored.
pub fn restore_escrows(engine: &EscrowEngine, ledger: &InMemoryLedger) -> usize {
    let open = engine.store().scan_live(usize::MAX, |o| !o.state.is_terminal());
    let mut restored = 0;
    for order in &open {
        match ledger.lock(order.id, order.seller_id, order.amount) {
            Ok(_) => restored += 1,
            Err(e) => tracing::error!(order_id = %order.id, error = %e, "failed to restore escrow"),
        }
    }
    if restored > 0 {
        tracing::info!(restored, "restored open escrows in the in-process ledger");
    }
    restored
}

fn log_banner(config: &AppConfig, engine: &EscrowEngine, ledger: &dyn EscrowLedger) {
    let engine_config = engine.config();
    tracing::info!(
        port = config.port,
        auth = if config.auth_token.is_some() { "token" } else { "development" },
        persistence = if config.database_url.is_some() { "postgres" } else { "memory" },
        ledger = ledger.ledger_name(),
        token = %engine.token_currency(),
        fee_bps = engine_config.fee_bps,
        payment_window_secs = engine_config.payment_window_secs,
        scan_interval_secs = engine_config.scan_interval_secs,
        "escrow service configured"
    );
}
