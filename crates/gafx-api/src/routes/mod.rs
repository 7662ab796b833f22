//! # API Route Modules
//!
//! | Prefix | Module |
//! |---|---|
//! | `/v1/orders`, `/v1/orders/{id}/{mark-paid,cancel,release}` | [`orders`] |
//! | `/v1/orders/{id}/messages` | [`messages`] |
//! | `/v1/orders/{id}/dispute`, `/v1/orders/{id}/resolve-*`, `/v1/disputes` | [`disputes`] |
//! | `/v1/quotes/*` | [`quotes`] |

pub mod disputes;
pub mod messages;
pub mod orders;
pub mod quotes;

use axum::Json;
use uuid::Uuid;

use gafx_core::OrderId;
use gafx_escrow::{Command, EscrowEngine, EscrowError, Order};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;
use orders::OrderView;

/// Run engine work on tokio's blocking pool.
///
/// Mutations hold an order's commit gate across the custodial ledger
/// call and its retry backoff, so they never run on a runtime worker.
pub(crate) async fn on_engine<T, F>(state: &AppState, work: F) -> Result<T, AppError>
where
    F: FnOnce(&EscrowEngine) -> Result<T, EscrowError> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || work(&engine))
        .await
        .map_err(|e| AppError::Internal(format!("engine task failed: {e}")))?
        .map_err(AppError::from)
}

/// Run a mutation of order `id`, write the result through, and render it.
pub(crate) async fn write_through<F>(state: &AppState, id: Uuid, mutate: F) -> Result<Json<OrderView>, AppError>
where
    F: FnOnce(&EscrowEngine, OrderId) -> Result<Order, EscrowError> + Send + 'static,
{
    let order_id = OrderId::from_uuid(id);
    let order = on_engine(state, move |engine| mutate(engine, order_id)).await?;
    state.persist(&order).await;
    Ok(Json(OrderView::render(&order, state.engine.now())))
}

/// Submit `command` for the caller through the engine.
pub(crate) async fn apply(
    state: &AppState,
    id: Uuid,
    caller: CallerIdentity,
    command: Command,
    expected_version: Option<u64>,
) -> Result<Json<OrderView>, AppError> {
    let actor = caller.actor();
    write_through(state, id, move |engine, order_id| {
        engine.submit(order_id, &actor, command, expected_version)
    })
    .await
}
