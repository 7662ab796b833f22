//! # Quote Routes
//!
//! Read-only calculators backed by the engine's fee schedule and pricing
//! oracle.
//!
//! ## Endpoints
//!
//! - `GET /v1/quotes/fee?amount=` — escrow fee and net amount
//! - `GET /v1/quotes/convert?from=&to=&amount=` — currency conversion
//! - `GET /v1/quotes/rates` — USD reference rates of every currency

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use gafx_core::CurrencyCode;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
pub struct FeeQuery {
    /// Token amount in minor units.
    pub amount: u64,
}

/// Fee owed if an escrow of `amount` is released.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FeeQuote {
    pub token: String,
    pub amount: u64,
    pub fee_bps: u32,
    pub fee: u64,
    /// What the buyer receives on release.
    pub net_amount: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConvertQuery {
    pub from: String,
    pub to: String,
    /// Amount of `from` in minor units.
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversionQuote {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub converted: u64,
    /// Units of `to` per unit of `from`, scaled by 1e6.
    pub rate: u64,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReferenceRate {
    pub currency: String,
    /// USD per unit, scaled by 1e6.
    pub usd_rate: u64,
}

fn currency(field: &str, raw: &str) -> Result<CurrencyCode, AppError> {
    CurrencyCode::new(raw.trim().to_ascii_uppercase())
        .map_err(|e| AppError::Validation(format!("{field}: {e}")))
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/quotes/fee", get(fee_quote))
        .route("/v1/quotes/convert", get(convert))
        .route("/v1/quotes/rates", get(reference_rates))
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /v1/quotes/fee — Escrow fee for an amount.
#[utoipa::path(
    get,
    path = "/v1/quotes/fee",
    params(FeeQuery),
    responses(
        (status = 200, description = "Fee quote", body = FeeQuote),
        (status = 422, description = "Non-positive amount", body = crate::error::ErrorBody),
    ),
    tag = "quotes"
)]
pub(crate) async fn fee_quote(
    State(state): State<AppState>,
    query: Result<Query<FeeQuery>, QueryRejection>,
) -> Result<Json<FeeQuote>, AppError> {
    let FeeQuery { amount } = extract_query(query)?;
    if amount == 0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }
    let fees = state.engine.fees();
    Ok(Json(FeeQuote {
        token: state.engine.token_currency().to_string(),
        amount,
        fee_bps: fees.bps(),
        fee: fees.fee_for(amount),
        net_amount: fees.net_of(amount),
    }))
}

/// GET /v1/quotes/convert — Convert between supported currencies.
#[utoipa::path(
    get,
    path = "/v1/quotes/convert",
    params(ConvertQuery),
    responses(
        (status = 200, description = "Conversion", body = ConversionQuote),
        (status = 422, description = "Unsupported currency or bad amount", body = crate::error::ErrorBody),
    ),
    tag = "quotes"
)]
pub(crate) async fn convert(
    State(state): State<AppState>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
) -> Result<Json<ConversionQuote>, AppError> {
    let query = extract_query(query)?;
    let from = currency("from", &query.from)?;
    let to = currency("to", &query.to)?;
    let quote = state.engine.oracle().quote(&from, &to, query.amount)?;
    Ok(Json(ConversionQuote {
        from: quote.base.to_string(),
        to: quote.quote.to_string(),
        amount: quote.base_amount,
        converted: quote.quote_amount,
        rate: quote.rate,
        quoted_at: quote.quoted_at,
    }))
}

/// GET /v1/quotes/rates — Reference rates of every supported currency.
#[utoipa::path(
    get,
    path = "/v1/quotes/rates",
    responses(
        (status = 200, description = "Reference rates", body = Vec<ReferenceRate>),
    ),
    tag = "quotes"
)]
pub(crate) async fn reference_rates(State(state): State<AppState>) -> Json<Vec<ReferenceRate>> {
    Json(
        state
            .engine
            .oracle()
            .reference_rates()
            .into_iter()
            .map(|(code, usd_rate)| ReferenceRate {
                currency: code.to_string(),
                usd_rate,
            })
            .collect(),
    )
}
