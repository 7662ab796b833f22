//! # Dispute Routes
//!
//! Raising disputes, admin decisions, and the admin dispute queue.
//!
//! ## Endpoints
//!
//! - `POST /v1/orders/{id}/dispute` — buyer or seller raises a dispute
//! - `GET /v1/orders/{id}/dispute` — dispute record of an order
//! - `POST /v1/orders/{id}/resolve-buyer` — admin releases to the buyer
//! - `POST /v1/orders/{id}/resolve-seller` — admin refunds the seller
//! - `POST /v1/orders/{id}/request-info` — admin asks for more evidence
//! - `GET /v1/disputes?status=` — admin queue with per-status counts

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use gafx_core::OrderId;
use gafx_escrow::{Dispute, DisputeCounts, DisputeQueue, DisputeSummary};
use gafx_state::DisputeStatus;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, OptionalJson, Validate};
use crate::routes::write_through;
use crate::routes::orders::{OrderView, VersionedRequest};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to raise a dispute.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RaiseDisputeRequest {
    pub expected_version: Option<u64>,
    /// Machine-readable reason, e.g. "seller_not_releasing".
    pub reason_code: String,
}

impl Validate for RaiseDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason_code.trim().is_empty() {
            return Err("reason_code must not be empty".to_string());
        }
        Ok(())
    }
}

/// Request for more evidence from the parties.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RequestInfoRequest {
    pub expected_version: Option<u64>,
    /// Posted to the order chat as an admin message.
    pub note: Option<String>,
}

/// A dispute as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisputeView {
    pub order_id: Uuid,
    pub initiator_id: Uuid,
    pub reason_code: String,
    /// OPEN, INVESTIGATING, or RESOLVED.
    pub status: String,
    /// BUYER_FAVOR or SELLER_FAVOR once resolved.
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub info_requests: u32,
}

impl From<&Dispute> for DisputeView {
    fn from(d: &Dispute) -> Self {
        Self {
            order_id: *d.order_id.as_uuid(),
            initiator_id: *d.initiator_id.as_uuid(),
            reason_code: d.reason_code.clone(),
            status: d.status.as_str().to_string(),
            resolution: d.resolution.map(|r| r.as_str().to_string()),
            created_at: d.created_at,
            resolved_at: d.resolved_at,
            resolved_by: d.resolved_by.map(|a| *a.as_uuid()),
            info_requests: d.info_requests,
        }
    }
}

/// One row of the admin queue.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisputeSummaryView {
    pub order_id: Uuid,
    pub order_state: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount: u64,
    pub initiator_id: Uuid,
    pub reason_code: String,
    pub status: String,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub info_requests: u32,
}

impl From<&DisputeSummary> for DisputeSummaryView {
    fn from(s: &DisputeSummary) -> Self {
        Self {
            order_id: *s.order_id.as_uuid(),
            order_state: s.order_state.as_str().to_string(),
            buyer_id: *s.buyer_id.as_uuid(),
            seller_id: *s.seller_id.as_uuid(),
            amount: s.amount,
            initiator_id: *s.initiator_id.as_uuid(),
            reason_code: s.reason_code.clone(),
            status: s.status.as_str().to_string(),
            resolution: s.resolution.map(|r| r.as_str().to_string()),
            created_at: s.created_at,
            info_requests: s.info_requests,
        }
    }
}

/// Dispute totals by status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisputeCountsView {
    pub open: usize,
    pub investigating: usize,
    pub resolved: usize,
    /// Open plus investigating.
    pub pending: usize,
}

impl From<DisputeCounts> for DisputeCountsView {
    fn from(c: DisputeCounts) -> Self {
        Self {
            open: c.open,
            investigating: c.investigating,
            resolved: c.resolved,
            pending: c.pending(),
        }
    }
}

/// Admin dispute queue, oldest first.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisputeQueueResponse {
    pub items: Vec<DisputeSummaryView>,
    /// Counts across all disputes, regardless of the filter.
    pub counts: DisputeCountsView,
}

impl From<DisputeQueue> for DisputeQueueResponse {
    fn from(q: DisputeQueue) -> Self {
        Self {
            items: q.items.iter().map(DisputeSummaryView::from).collect(),
            counts: q.counts.into(),
        }
    }
}

/// Query of `GET /v1/disputes`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct DisputeFilter {
    /// OPEN, INVESTIGATING, or RESOLVED.
    pub status: Option<String>,
}

impl DisputeFilter {
    fn status(&self) -> Result<Option<DisputeStatus>, AppError> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(AppError::BadRequest),
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}/dispute", get(get_dispute).post(raise_dispute))
        .route("/v1/orders/{id}/resolve-buyer", post(resolve_buyer))
        .route("/v1/orders/{id}/resolve-seller", post(resolve_seller))
        .route("/v1/orders/{id}/request-info", post(request_info))
        .route("/v1/disputes", get(list_disputes))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/orders/{id}/dispute — Raise a dispute and freeze the order.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/dispute",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RaiseDisputeRequest,
    responses(
        (status = 200, description = "Order moved to DISPUTED", body = OrderView),
        (status = 403, description = "Not a counterparty", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn raise_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RaiseDisputeRequest>, JsonRejection>,
) -> Result<Json<OrderView>, AppError> {
    let req = extract_validated_json(body)?;
    let actor = caller.actor();
    write_through(&state, id, move |engine, order_id| {
        engine
            .arbitration()
            .raise_dispute(order_id, &actor, req.reason_code, req.expected_version)
    })
    .await
}

/// GET /v1/orders/{id}/dispute — Dispute record of an order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}/dispute",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Dispute", body = DisputeView),
        (status = 404, description = "Unknown order or no dispute", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn get_dispute(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<DisputeView>, AppError> {
    let dispute = state
        .engine
        .arbitration()
        .get_dispute(OrderId::from_uuid(id), &caller.actor())?;
    Ok(Json(DisputeView::from(&dispute)))
}

/// POST /v1/orders/{id}/resolve-buyer — Admin decides for the buyer.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/resolve-buyer",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = VersionedRequest,
    responses(
        (status = 200, description = "Escrow released to the buyer", body = OrderView),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn resolve_buyer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<VersionedRequest>,
) -> Result<Json<OrderView>, AppError> {
    let actor = caller.actor();
    write_through(&state, id, move |engine, order_id| {
        engine
            .arbitration()
            .resolve_buyer(order_id, &actor, req.expected_version)
    })
    .await
}

/// POST /v1/orders/{id}/resolve-seller — Admin decides for the seller.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/resolve-seller",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = VersionedRequest,
    responses(
        (status = 200, description = "Escrow refunded to the seller", body = OrderView),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn resolve_seller(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<VersionedRequest>,
) -> Result<Json<OrderView>, AppError> {
    let actor = caller.actor();
    write_through(&state, id, move |engine, order_id| {
        engine
            .arbitration()
            .resolve_seller(order_id, &actor, req.expected_version)
    })
    .await
}

/// POST /v1/orders/{id}/request-info — Admin asks the parties for evidence.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/request-info",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = RequestInfoRequest,
    responses(
        (status = 200, description = "Dispute moved to INVESTIGATING", body = OrderView),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn request_info(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<RequestInfoRequest>,
) -> Result<Json<OrderView>, AppError> {
    let actor = caller.actor();
    write_through(&state, id, move |engine, order_id| {
        engine
            .arbitration()
            .request_info(order_id, &actor, req.note, req.expected_version)
    })
    .await
}

/// GET /v1/disputes — Admin dispute queue.
#[utoipa::path(
    get,
    path = "/v1/disputes",
    params(DisputeFilter),
    responses(
        (status = 200, description = "Dispute queue", body = DisputeQueueResponse),
        (status = 400, description = "Unknown status filter", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn list_disputes(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<DisputeFilter>, QueryRejection>,
) -> Result<Json<DisputeQueueResponse>, AppError> {
    let filter = extract_query(query)?;
    let queue = state
        .engine
        .arbitration()
        .list_disputes(&caller.actor(), filter.status()?)?;
    Ok(Json(queue.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_parsing() {
        let parse = |s: Option<&str>| {
            DisputeFilter {
                status: s.map(str::to_string),
            }
            .status()
        };
        assert_eq!(parse(None).unwrap(), None);
        assert_eq!(parse(Some("open")).unwrap(), Some(DisputeStatus::Open));
        assert_eq!(
            parse(Some("INVESTIGATING")).unwrap(),
            Some(DisputeStatus::Investigating)
        );
        assert!(matches!(parse(Some("closed")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn counts_view_includes_pending() {
        let view = DisputeCountsView::from(DisputeCounts {
            open: 2,
            investigating: 1,
            resolved: 4,
        });
        assert_eq!(view.pending, 3);
    }
}
