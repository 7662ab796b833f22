//! # gafx-api — Axum API Service for the GAF Escrow Engine
//!
//! HTTP surface over [`gafx_escrow::EscrowEngine`]. Handlers translate
//! requests into engine calls, write the results through to Postgres
//! when configured, and render view DTOs. No lifecycle rule lives here.
//!
//! ## API Surface
//!
//! | Prefix | Module |
//! |---|---|
//! | `/v1/orders/*` | [`routes::orders`], [`routes::messages`], [`routes::disputes`] |
//! | `/v1/disputes` | [`routes::disputes`] |
//! | `/v1/quotes/*` | [`routes::quotes`] |
//! | `/openapi.json` | [`openapi`] |
//! | `/health/*`, `/metrics` | unauthenticated |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::{AppConfig, AppState};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/metrics` are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::messages::router())
        .merge(routes::disputes::router())
        .merge(routes::quotes::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(render_metrics))
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 200 once the service can serve traffic. With a
/// database configured, the database must answer.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!(error = %e, "readiness check failed: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    (StatusCode::OK, "ready")
}

/// Prometheus text exposition of everything recorded through `metrics`:
/// request metrics and the engine's counters. Empty when no recorder is
/// installed.
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
