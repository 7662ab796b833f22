//! # Order Routes
//!
//! Order placement, lookup, and the participant transitions.
//!
//! ## Endpoints
//!
//! - `POST /v1/orders` — place an order (locks the seller's tokens)
//! - `GET /v1/orders` — orders visible to the caller
//! - `GET /v1/orders/{id}` — one order, with `time_left_secs`
//! - `POST /v1/orders/{id}/mark-paid` — buyer claims payment
//! - `POST /v1/orders/{id}/cancel` — cancel before payment
//! - `POST /v1/orders/{id}/release` — seller releases the escrow
//!
//! Every transition body may carry `expected_version`; a stale version is
//! answered with 409 `VERSION_CONFLICT`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gafx_core::{ActorId, CurrencyCode, OrderId};
use gafx_escrow::{Command, Order, OrderDraft, OrderLimits, Settlement};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, OptionalJson, Validate};
use crate::routes::{apply, on_engine};
use crate::routes::disputes::DisputeView;
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to place an order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// Token quantity in minor units.
    pub amount: u64,
    /// Fiat currency the buyer pays in, e.g. "UGX".
    pub fiat_currency: String,
    /// Payment method from the advertisement, e.g. "Mobile Money".
    pub payment_method: Option<String>,
    pub min_limit: Option<u64>,
    pub max_limit: Option<u64>,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), String> {
        if self.amount == 0 {
            return Err("amount must be positive".to_string());
        }
        if self.fiat_currency.trim().is_empty() {
            return Err("fiat_currency must not be empty".to_string());
        }
        Ok(())
    }
}

impl CreateOrderRequest {
    fn into_draft(self) -> Result<OrderDraft, AppError> {
        let fiat_currency = CurrencyCode::new(self.fiat_currency)
            .map_err(|e| AppError::Validation(format!("fiat_currency: {e}")))?;
        let limits = match (self.min_limit, self.max_limit) {
            (None, None) => None,
            (min, max) => Some(OrderLimits {
                min: min.unwrap_or(0),
                max: max.unwrap_or(u64::MAX),
            }),
        };
        Ok(OrderDraft {
            buyer_id: ActorId::from_uuid(self.buyer_id),
            seller_id: ActorId::from_uuid(self.seller_id),
            amount: self.amount,
            fiat_currency,
            payment_method: self.payment_method,
            limits,
        })
    }
}

/// Body of transitions without a payload.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VersionedRequest {
    /// Version the caller acted on.
    pub expected_version: Option<u64>,
}

/// Body of `mark-paid`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarkPaidRequest {
    pub expected_version: Option<u64>,
    /// Reference of the off-platform payment, e.g. a mobile money
    /// transaction id.
    pub payment_proof: Option<String>,
}

/// Frozen price quote of an order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuoteView {
    pub token: String,
    pub fiat_currency: String,
    /// Amount the buyer pays, in fiat minor units.
    pub fiat_amount: u64,
    /// Fiat units per token unit, scaled by 1e6.
    pub rate: u64,
    pub quoted_at: DateTime<Utc>,
}

/// Final fund disposition of an order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettlementView {
    /// "release" or "refund".
    pub op: String,
    /// "buyer" or "seller".
    pub recipient: String,
    pub recipient_id: Uuid,
    pub amount: u64,
    pub fee: u64,
    pub receipt: String,
    pub settled_at: DateTime<Utc>,
}

impl From<&Settlement> for SettlementView {
    fn from(s: &Settlement) -> Self {
        Self {
            op: s.op.as_str().to_string(),
            recipient: s.recipient.to_string(),
            recipient_id: *s.recipient_id.as_uuid(),
            amount: s.amount,
            fee: s.fee,
            receipt: s.receipt.clone(),
            settled_at: s.settled_at,
        }
    }
}

/// An order as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// Locked token quantity in minor units.
    pub amount: u64,
    pub price: QuoteView,
    pub payment_method: Option<String>,
    pub state: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phase_deadline: Option<DateTime<Utc>>,
    /// Whole seconds until `phase_deadline`, never negative.
    pub time_left_secs: Option<i64>,
    pub escrow_ref: String,
    /// Fee withheld if the escrow is released.
    pub fee_amount: u64,
    pub payment_proof: Option<String>,
    pub dispute: Option<DisputeView>,
    pub settlement: Option<SettlementView>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl OrderView {
    pub fn render(order: &Order, now: DateTime<Utc>) -> Self {
        Self {
            id: *order.id.as_uuid(),
            buyer_id: *order.buyer_id.as_uuid(),
            seller_id: *order.seller_id.as_uuid(),
            amount: order.amount,
            price: QuoteView {
                token: order.price_quote.base.to_string(),
                fiat_currency: order.price_quote.quote.to_string(),
                fiat_amount: order.price_quote.quote_amount,
                rate: order.price_quote.rate,
                quoted_at: order.price_quote.quoted_at,
            },
            payment_method: order.payment_method.clone(),
            state: order.state.as_str().to_string(),
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
            phase_deadline: order.phase_deadline,
            time_left_secs: order.time_left(now).map(|d| d.num_seconds()),
            escrow_ref: order.escrow_ref.as_str().to_string(),
            fee_amount: order.fee_amount,
            payment_proof: order.payment_proof.clone(),
            dispute: order.dispute.as_ref().map(DisputeView::from),
            settlement: order.settlement.as_ref().map(SettlementView::from),
            archived_at: order.archived_at,
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", get(list_orders).post(create_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/mark-paid", post(mark_paid))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/release", post(release_escrow))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/orders — Place an order.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed, tokens locked", body = OrderView),
        (status = 403, description = "Caller is not a counterparty", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error or ledger rejection", body = crate::error::ErrorBody),
        (status = 503, description = "Ledger unavailable", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let draft = extract_validated_json(body)?.into_draft()?;
    let actor = caller.actor();
    let order = on_engine(&state, move |engine| engine.create_order(&actor, draft)).await?;
    state.persist(&order).await;
    Ok((
        StatusCode::CREATED,
        Json(OrderView::render(&order, state.engine.now())),
    ))
}

/// GET /v1/orders — Orders visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/v1/orders",
    responses(
        (status = 200, description = "Orders", body = Vec<OrderView>),
    ),
    tag = "orders"
)]
pub(crate) async fn list_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Json<Vec<OrderView>> {
    let now = state.engine.now();
    Json(
        state
            .engine
            .orders_for(&caller.actor())
            .iter()
            .map(|o| OrderView::render(o, now))
            .collect(),
    )
}

/// GET /v1/orders/{id} — Fetch one order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = OrderView),
        (status = 403, description = "Not a participant", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown order", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .engine
        .get_order(OrderId::from_uuid(id), &caller.actor())?;
    Ok(Json(OrderView::render(&order, state.engine.now())))
}

/// POST /v1/orders/{id}/mark-paid — Buyer claims the fiat payment was sent.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/mark-paid",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Order moved to PAYMENT_CLAIMED", body = OrderView),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn mark_paid(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<MarkPaidRequest>,
) -> Result<Json<OrderView>, AppError> {
    let command = Command::MarkPaid {
        payment_proof: req.payment_proof,
    };
    apply(&state, id, caller, command, req.expected_version).await
}

/// POST /v1/orders/{id}/cancel — Cancel an unpaid order and refund the escrow.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = VersionedRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderView),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn cancel_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<VersionedRequest>,
) -> Result<Json<OrderView>, AppError> {
    apply(&state, id, caller, Command::Cancel, req.expected_version).await
}

/// POST /v1/orders/{id}/release — Seller confirms receipt and releases the escrow.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/release",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = VersionedRequest,
    responses(
        (status = 200, description = "Escrow released to the buyer", body = OrderView),
        (status = 409, description = "Invalid transition or version conflict", body = crate::error::ErrorBody),
        (status = 503, description = "Ledger unavailable, nothing committed", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn release_escrow(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<VersionedRequest>,
) -> Result<Json<OrderView>, AppError> {
    apply(&state, id, caller, Command::ReleaseEscrow, req.expected_version).await
}
