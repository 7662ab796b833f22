//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GAFX Escrow API",
        version = "0.1.0",
        description = "Escrow order lifecycle for GAF P2P trading: orders, per-order chat, dispute arbitration, and quotes.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Orders
        crate::routes::orders::create_order,
        crate::routes::orders::list_orders,
        crate::routes::orders::get_order,
        crate::routes::orders::mark_paid,
        crate::routes::orders::cancel_order,
        crate::routes::orders::release_escrow,
        // Messages
        crate::routes::messages::list_messages,
        crate::routes::messages::send_message,
        // Disputes
        crate::routes::disputes::raise_dispute,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::resolve_buyer,
        crate::routes::disputes::resolve_seller,
        crate::routes::disputes::request_info,
        crate::routes::disputes::list_disputes,
        // Quotes
        crate::routes::quotes::fee_quote,
        crate::routes::quotes::convert,
        crate::routes::quotes::reference_rates,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::orders::CreateOrderRequest,
        crate::routes::orders::VersionedRequest,
        crate::routes::orders::MarkPaidRequest,
        crate::routes::orders::OrderView,
        crate::routes::orders::QuoteView,
        crate::routes::orders::SettlementView,
        crate::routes::messages::SendMessageRequest,
        crate::routes::messages::MessageView,
        crate::routes::messages::MessageBodyView,
        crate::routes::messages::MessagePage,
        crate::routes::disputes::RaiseDisputeRequest,
        crate::routes::disputes::RequestInfoRequest,
        crate::routes::disputes::DisputeView,
        crate::routes::disputes::DisputeSummaryView,
        crate::routes::disputes::DisputeCountsView,
        crate::routes::disputes::DisputeQueueResponse,
        crate::routes::quotes::FeeQuote,
        crate::routes::quotes::ConversionQuote,
        crate::routes::quotes::ReferenceRate,
    )),
    tags(
        (name = "orders", description = "Order placement and participant transitions"),
        (name = "messages", description = "Per-order chat"),
        (name = "disputes", description = "Disputes and admin arbitration"),
        (name = "quotes", description = "Fee calculator and currency converter"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_order_action() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for action in [
            "mark-paid",
            "cancel",
            "release",
            "dispute",
            "resolve-buyer",
            "resolve-seller",
            "request-info",
        ] {
            let path = format!("/v1/orders/{{id}}/{action}");
            assert!(paths.iter().any(|p| **p == path), "missing {path}");
        }
        assert!(doc.paths.paths.contains_key("/v1/disputes"));
        assert!(doc.paths.paths.contains_key("/v1/quotes/convert"));
    }
}
