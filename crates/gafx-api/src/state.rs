//! # Application State
//!
//! Shared state handed to every handler: the escrow engine (which owns
//! the in-memory order store), the service configuration, the optional
//! Postgres pool, and the optional Prometheus handle.
//!
//! ## Write-through persistence
//!
//! The engine is the source of truth while the process runs. After every
//! successful mutation the handler calls [`AppState::persist`], which
//! upserts the order snapshot and inserts every message past the highest
//! seq already stored. A failed write is logged, not surfaced: the
//! mutation is already committed, and the next write of the same order
//! carries the full snapshot and the whole missing message tail again.

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use gafx_core::OrderId;
use gafx_escrow::{EscrowEngine, Order};

/// Service configuration, read from the environment.
///
/// Custom `Debug` redacts the `auth_token` and `database_url`.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, secrets are not checked.
    pub auth_token: Option<String>,
    /// Postgres connection string. If `None`, the service runs in memory.
    pub database_url: Option<String>,
    /// Path of the engine's YAML configuration file.
    pub escrow_config: Option<String>,
}

impl AppConfig {
    /// Read `PORT`, `AUTH_TOKEN`, `DATABASE_URL`, and `ESCROW_CONFIG`.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            port,
            auth_token: non_empty("AUTH_TOKEN"),
            database_url: non_empty("DATABASE_URL"),
            escrow_config: non_empty("ESCROW_CONFIG"),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("escrow_config", &self.escrow_config)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            escrow_config: None,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: EscrowEngine,
    pub config: AppConfig,
    /// When `Some`, orders and messages are written through to Postgres.
    pub db_pool: Option<PgPool>,
    /// Renders the engine counters on `/metrics`. `None` when no global
    /// recorder is installed (tests).
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("db_pool", &self.db_pool.is_some())
            .field("prometheus", &self.prometheus.is_some())
            .finish()
    }
}

impl AppState {
    /// In-memory state without persistence or a Prometheus recorder.
    pub fn new(engine: EscrowEngine, config: AppConfig) -> Self {
        Self {
            engine,
            config,
            db_pool: None,
            prometheus: None,
        }
    }

    pub fn with_db_pool(mut self, pool: Option<PgPool>) -> Self {
        self.db_pool = pool;
        self
    }

    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = handle;
        self
    }

    /// Write an order snapshot and its unsaved messages through to the
    /// database, if one is configured.
    pub async fn persist(&self, order: &Order) {
        let Some(pool) = &self.db_pool else {
            return;
        };
        if let Err(e) = crate::db::orders::save_order(pool, order).await {
            tracing::error!(order_id = %order.id, version = order.version, error = %e, "failed to persist order");
            return;
        }
        if order.is_archived() {
            if let Err(e) = crate::db::orders::delete_messages(pool, order.id).await {
                tracing::error!(order_id = %order.id, error = %e, "failed to drop archived messages");
            }
            return;
        }
        self.persist_messages(order.id).await;
    }

    /// Insert every message of an order past the highest seq the database
    /// holds. Earlier failed inserts are retried here.
    pub async fn persist_messages(&self, order_id: OrderId) {
        let Some(pool) = &self.db_pool else {
            return;
        };
        let stored = match crate::db::orders::max_seq(pool, order_id).await {
            Ok(seq) => seq,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to read stored message seq");
                return;
            }
        };
        let messages = match self.engine.store().messages_after(order_id, stored, usize::MAX) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to read messages for persistence");
                return;
            }
        };
        if let Err(e) = crate::db::orders::save_messages(pool, &messages).await {
            tracing::error!(order_id = %order_id, after_seq = stored, error = %e, "failed to persist messages");
        }
    }

    /// Load persisted orders and messages into the engine's store.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let records = crate::db::orders::load_all(pool)
            .await
            .map_err(|e| format!("failed to load orders: {e}"))?;
        let order_count = records.len();
        let mut message_count = 0;
        for (order, messages) in records {
            message_count += messages.len();
            let order_id = order.id;
            self.engine
                .store()
                .hydrate(order, messages)
                .map_err(|e| format!("refusing to load order {order_id}: {e}"))?;
        }

        tracing::info!(
            orders = order_count,
            messages = message_count,
            "hydrated in-memory store from database"
        );
        Ok(())
    }
}
