//! # Integration Tests for gafx-api
//!
//! Drives the full router in-process: order lifecycle, optimistic
//! versioning, chat, dispute arbitration, quotes, authentication, and
//! the unauthenticated operational endpoints.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use gafx_api::bootstrap::bootstrap;
use gafx_api::state::{AppConfig, AppState};
use gafx_core::{ActorId, OrderId, SystemClock};
use gafx_escrow::{
    EngineConfig, EscrowEngine, EscrowLedger, EscrowRef, InMemoryLedger, LedgerError, Receipt,
    StaticRateOracle,
};

/// Helper: build the test app with dev-mode auth and no database.
fn test_app() -> axum::Router {
    let (state, _ledger) = bootstrap(AppConfig::default(), None, None).unwrap();
    gafx_api::app(state)
}

/// Helper: build the test app and keep a handle on its state.
fn test_state() -> (AppState, axum::Router) {
    let (state, _ledger) = bootstrap(AppConfig::default(), None, None).unwrap();
    let app = gafx_api::app(state.clone());
    (state, app)
}

/// Helper: build the test app with a shared secret.
fn test_app_with_secret(secret: &str) -> axum::Router {
    let config = AppConfig {
        auth_token: Some(secret.to_string()),
        ..AppConfig::default()
    };
    let (state, _ledger) = bootstrap(config, None, None).unwrap();
    gafx_api::app(state)
}

struct Parties {
    buyer: Uuid,
    seller: Uuid,
    admin: Uuid,
}

impl Parties {
    fn new() -> Self {
        Self {
            buyer: Uuid::new_v4(),
            seller: Uuid::new_v4(),
            admin: Uuid::new_v4(),
        }
    }

    fn buyer(&self) -> String {
        format!("buyer:{}:x", self.buyer)
    }

    fn seller(&self) -> String {
        format!("seller:{}:x", self.seller)
    }

    fn admin(&self) -> String {
        format!("admin:{}:x", self.admin)
    }
}

/// Helper: send a request and decode the JSON response.
async fn call(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create_order(app: &axum::Router, parties: &Parties, amount: u64) -> Value {
    let (status, order) = call(
        app,
        "POST",
        "/v1/orders",
        Some(&parties.buyer()),
        Some(json!({
            "buyer_id": parties.buyer,
            "seller_id": parties.seller,
            "amount": amount,
            "fiat_currency": "UGX",
            "payment_method": "Mobile Money",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

fn order_uri(order: &Value, suffix: &str) -> String {
    format!("/v1/orders/{}{}", order["id"].as_str().unwrap(), suffix)
}

// -- Order Lifecycle ----------------------------------------------------------

#[tokio::test]
async fn test_happy_path_release_pays_buyer_net_of_fee() {
    let app = test_app();
    let parties = Parties::new();

    let order = create_order(&app, &parties, 1000).await;
    assert_eq!(order["state"], "AWAITING_PAYMENT");
    assert_eq!(order["version"], 1);
    assert_eq!(order["fee_amount"], 5);
    assert_eq!(order["price"]["token"], "GAF");
    assert_eq!(order["price"]["fiat_currency"], "UGX");
    assert!(order["time_left_secs"].as_i64().unwrap() > 0);

    let (status, paid) = call(
        &app,
        "POST",
        &order_uri(&order, "/mark-paid"),
        Some(&parties.buyer()),
        Some(json!({ "expected_version": 1, "payment_proof": "MTN-8812" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["state"], "PAYMENT_CLAIMED");
    assert_eq!(paid["version"], 2);
    assert_eq!(paid["payment_proof"], "MTN-8812");

    let (status, released) = call(
        &app,
        "POST",
        &order_uri(&order, "/release"),
        Some(&parties.seller()),
        Some(json!({ "expected_version": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{released}");
    assert_eq!(released["state"], "ESCROW_RELEASED");
    assert_eq!(released["version"], 3);
    assert!(released["phase_deadline"].is_null());
    let settlement = &released["settlement"];
    assert_eq!(settlement["op"], "release");
    assert_eq!(settlement["recipient"], "buyer");
    assert_eq!(settlement["amount"], 995);
    assert_eq!(settlement["fee"], 5);
}

#[tokio::test]
async fn test_stale_version_is_rejected() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;

    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/mark-paid"),
        Some(&parties.buyer()),
        Some(json!({ "expected_version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The seller acted on the version it saw before the buyer's claim.
    let (status, body) = call(
        &app,
        "POST",
        &order_uri(&order, "/cancel"),
        Some(&parties.seller()),
        Some(json!({ "expected_version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "VERSION_CONFLICT");
    assert_eq!(body["error"]["details"]["expected_version"], 1);
    assert_eq!(body["error"]["details"]["current_version"], 2);
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;

    // Release before payment was claimed.
    let (status, body) = call(
        &app,
        "POST",
        &order_uri(&order, "/release"),
        Some(&parties.seller()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (_, current) = call(&app, "GET", &order_uri(&order, ""), Some(&parties.buyer()), None).await;
    assert_eq!(current["state"], "AWAITING_PAYMENT");
    assert_eq!(current["version"], 1);
}

#[tokio::test]
async fn test_cancel_refunds_and_closes_the_order() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 400).await;

    let (status, cancelled) = call(
        &app,
        "POST",
        &order_uri(&order, "/cancel"),
        Some(&parties.buyer()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["state"], "CANCELLED");
    assert_eq!(cancelled["settlement"]["op"], "refund");
    assert_eq!(cancelled["settlement"]["amount"], 400);
}

#[tokio::test]
async fn test_strangers_cannot_see_or_act_on_orders() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;
    let stranger = format!("buyer:{}:x", Uuid::new_v4());

    let (status, body) = call(&app, "GET", &order_uri(&order, ""), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/mark-paid"),
        Some(&stranger),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = call(&app, "GET", "/v1/orders", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 0);

    let (_, list) = call(&app, "GET", "/v1/orders", Some(&parties.seller()), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cannot_place_order_for_someone_else() {
    let app = test_app();
    let parties = Parties::new();
    let outsider = format!("buyer:{}:x", Uuid::new_v4());
    let (status, _) = call(
        &app,
        "POST",
        "/v1/orders",
        Some(&outsider),
        Some(json!({
            "buyer_id": parties.buyer,
            "seller_id": parties.seller,
            "amount": 10,
            "fiat_currency": "UGX",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_order_validation() {
    let app = test_app();
    let parties = Parties::new();

    let (status, body) = call(
        &app,
        "POST",
        "/v1/orders",
        Some(&parties.buyer()),
        Some(json!({
            "buyer_id": parties.buyer,
            "seller_id": parties.seller,
            "amount": 0,
            "fiat_currency": "UGX",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = call(
        &app,
        "POST",
        "/v1/orders",
        Some(&parties.buyer()),
        Some(json!({
            "buyer_id": parties.buyer,
            "seller_id": parties.seller,
            "amount": 100,
            "fiat_currency": "XYZ",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = test_app();
    let parties = Parties::new();
    let uri = format!("/v1/orders/{}", Uuid::new_v4());
    let (status, body) = call(&app, "GET", &uri, Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_action_accepts_empty_json_body() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;

    let request = Request::builder()
        .method("POST")
        .uri(order_uri(&order, "/mark-paid"))
        .header("authorization", format!("Bearer {}", parties.buyer()))
        .header("content-type", "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .method("POST")
        .uri(order_uri(&order, "/release"))
        .header("authorization", format!("Bearer {}", parties.seller()))
        .header("content-type", "application/json")
        .body(Body::from("{\"expected_version\": 1"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- Ledger Stalls ------------------------------------------------------------

/// A ledger whose releases wait until the test lets them through.
struct StalledLedger {
    inner: InMemoryLedger,
    entered: AtomicBool,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl EscrowLedger for StalledLedger {
    fn lock(&self, order_id: OrderId, owner: ActorId, amount: u64) -> Result<EscrowRef, LedgerError> {
        self.inner.lock(order_id, owner, amount)
    }

    fn release(&self, order_id: OrderId, amount: u64, fee: u64, recipient: ActorId) -> Result<Receipt, LedgerError> {
        self.entered.store(true, Ordering::SeqCst);
        let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(10));
        self.inner.release(order_id, amount, fee, recipient)
    }

    fn refund(&self, order_id: OrderId, amount: u64, recipient: ActorId) -> Result<Receipt, LedgerError> {
        self.inner.refund(order_id, amount, recipient)
    }

    fn ledger_name(&self) -> &str {
        "stalled"
    }
}

#[tokio::test]
async fn test_stalled_ledger_does_not_block_other_orders() {
    let (open_gate, gate) = mpsc::channel();
    let ledger = Arc::new(StalledLedger {
        inner: InMemoryLedger::unmetered(),
        entered: AtomicBool::new(false),
        gate: Mutex::new(gate),
    });
    let clock = Arc::new(SystemClock);
    let engine = EscrowEngine::new(
        EngineConfig::default(),
        ledger.clone(),
        Arc::new(StaticRateOracle::with_default_rates(clock.clone()).unwrap()),
        clock,
    )
    .unwrap();
    let app = gafx_api::app(AppState::new(engine, AppConfig::default()));

    let parties = Parties::new();
    let stalled = create_order(&app, &parties, 1000).await;
    let other = create_order(&app, &parties, 500).await;
    let (status, _) = call(&app, "POST", &order_uri(&stalled, "/mark-paid"), Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);

    let release = {
        let app = app.clone();
        let uri = order_uri(&stalled, "/release");
        let seller = parties.seller();
        tokio::spawn(async move { call(&app, "POST", &uri, Some(&seller), None).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ledger.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("release never reached the ledger");

    // The runtime keeps serving while the release waits on the ledger.
    let served = tokio::time::timeout(Duration::from_secs(5), async {
        let cancel = call(&app, "POST", &order_uri(&other, "/cancel"), Some(&parties.buyer()), None).await;
        let read = call(&app, "GET", &order_uri(&stalled, ""), Some(&parties.seller()), None).await;
        (cancel, read)
    })
    .await
    .expect("requests stalled behind the ledger");
    let ((cancel_status, cancelled), (read_status, read)) = served;
    assert_eq!(cancel_status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["state"], "CANCELLED");
    assert_eq!(read_status, StatusCode::OK);
    assert_eq!(read["state"], "PAYMENT_CLAIMED");

    open_gate.send(()).unwrap();
    let (status, released) = release.await.unwrap();
    assert_eq!(status, StatusCode::OK, "{released}");
    assert_eq!(released["state"], "ESCROW_RELEASED");
}

// -- Messages -----------------------------------------------------------------

#[tokio::test]
async fn test_chat_round_trip_and_close_on_terminal_state() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;
    let messages = order_uri(&order, "/messages");

    let (status, sent) = call(
        &app,
        "POST",
        &messages,
        Some(&parties.buyer()),
        Some(json!({ "type": "text", "text": "Sending now via MTN" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{sent}");
    assert_eq!(sent["seq"], 2);
    assert_eq!(sent["sender_role"], "buyer");

    let (status, sent) = call(
        &app,
        "POST",
        &messages,
        Some(&parties.seller()),
        Some(json!({ "type": "attachment", "name": "qr.png", "mime": "image/png", "size": 2048 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{sent}");
    assert_eq!(sent["body"]["kind"], "image");

    let (status, page) = call(&app, "GET", &messages, Some(&parties.seller()), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["sender_role"], "system");
    assert_eq!(page["next_after"], 3);
    assert_eq!(page["has_more"], false);

    let (_, page) = call(
        &app,
        "GET",
        &format!("{messages}?after=1&limit=1"),
        Some(&parties.buyer()),
        None,
    )
    .await;
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["seq"], 2);
    assert_eq!(page["next_after"], 2);
    assert_eq!(page["has_more"], true);

    call(&app, "POST", &order_uri(&order, "/cancel"), Some(&parties.seller()), None).await;

    let (status, body) = call(
        &app,
        "POST",
        &messages,
        Some(&parties.buyer()),
        Some(json!({ "type": "text", "text": "hello?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CHANNEL_CLOSED");

    // History stays readable after the chat closes.
    let (status, page) = call(&app, "GET", &messages, Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_polling_an_archived_chat_terminates() {
    let (state, app) = test_state();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;
    let messages = order_uri(&order, "/messages");
    call(&app, "POST", &messages, Some(&parties.buyer()), Some(json!({ "type": "text", "text": "hi" }))).await;
    let (status, _) = call(&app, "POST", &order_uri(&order, "/cancel"), Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);

    let order_id = OrderId::from_uuid(order["id"].as_str().unwrap().parse().unwrap());
    let archived = state
        .engine
        .store()
        .archive(order_id, state.engine.now())
        .unwrap();
    assert!(archived.is_some());

    let mut after = 0;
    for _ in 0..3 {
        let (status, page) = call(
            &app,
            "GET",
            &format!("{messages}?after={after}"),
            Some(&parties.seller()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{page}");
        assert!(page["items"].as_array().unwrap().is_empty());
        assert_eq!(page["has_more"], false, "{page}");
        after = page["next_after"].as_u64().unwrap();
        assert_eq!(after, 0);
    }
}

#[tokio::test]
async fn test_disallowed_attachment_is_rejected() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;
    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/messages"),
        Some(&parties.buyer()),
        Some(json!({ "type": "attachment", "name": "run.exe", "mime": "application/x-msdownload", "size": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Disputes -----------------------------------------------------------------

#[tokio::test]
async fn test_dispute_raise_queue_and_resolve_for_buyer() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;

    call(
        &app,
        "POST",
        &order_uri(&order, "/mark-paid"),
        Some(&parties.buyer()),
        Some(json!({})),
    )
    .await;

    let (status, disputed) = call(
        &app,
        "POST",
        &order_uri(&order, "/dispute"),
        Some(&parties.buyer()),
        Some(json!({ "reason_code": "seller_not_releasing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{disputed}");
    assert_eq!(disputed["state"], "DISPUTED");
    assert_eq!(disputed["dispute"]["status"], "OPEN");

    // Only admins see the queue.
    let (status, _) = call(&app, "GET", "/v1/disputes", Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, queue) = call(&app, "GET", "/v1/disputes?status=open", Some(&parties.admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    let ours: Vec<_> = queue["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|item| item["order_id"] == order["id"])
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0]["reason_code"], "seller_not_releasing");
    assert!(queue["counts"]["open"].as_u64().unwrap() >= 1);

    let (status, _) = call(&app, "GET", "/v1/disputes?status=bogus", Some(&parties.admin()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, investigating) = call(
        &app,
        "POST",
        &order_uri(&order, "/request-info"),
        Some(&parties.admin()),
        Some(json!({ "note": "Please upload the mobile money receipt" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{investigating}");
    assert_eq!(investigating["dispute"]["status"], "INVESTIGATING");

    // The admin may join the chat of a disputed order.
    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/messages"),
        Some(&parties.admin()),
        Some(json!({ "type": "text", "text": "Reviewing now" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Parties cannot resolve their own dispute.
    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/resolve-buyer"),
        Some(&parties.buyer()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, resolved) = call(
        &app,
        "POST",
        &order_uri(&order, "/resolve-buyer"),
        Some(&parties.admin()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{resolved}");
    assert_eq!(resolved["state"], "RESOLVED_BUYER");
    assert_eq!(resolved["dispute"]["status"], "RESOLVED");
    assert_eq!(resolved["dispute"]["resolution"], "BUYER_FAVOR");
    assert_eq!(resolved["settlement"]["amount"], 995);

    let (status, dispute) = call(&app, "GET", &order_uri(&order, "/dispute"), Some(&parties.seller()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispute["resolved_by"], json!(parties.admin));

    // A second resolution is not a valid transition.
    let (status, body) = call(
        &app,
        "POST",
        &order_uri(&order, "/resolve-seller"),
        Some(&parties.admin()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");
}

#[tokio::test]
async fn test_resolve_for_seller_refunds_seller() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 700).await;

    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/dispute"),
        Some(&parties.seller()),
        Some(json!({ "reason_code": "buyer_unresponsive" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, resolved) = call(
        &app,
        "POST",
        &order_uri(&order, "/resolve-seller"),
        Some(&parties.admin()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{resolved}");
    assert_eq!(resolved["state"], "RESOLVED_SELLER");
    assert_eq!(resolved["settlement"]["recipient"], "seller");
    assert_eq!(resolved["settlement"]["amount"], 700);
}

#[tokio::test]
async fn test_dispute_requires_reason() {
    let app = test_app();
    let parties = Parties::new();
    let order = create_order(&app, &parties, 1000).await;
    let (status, _) = call(
        &app,
        "POST",
        &order_uri(&order, "/dispute"),
        Some(&parties.buyer()),
        Some(json!({ "reason_code": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Quotes -------------------------------------------------------------------

#[tokio::test]
async fn test_fee_quote() {
    let app = test_app();
    let parties = Parties::new();
    let (status, quote) = call(&app, "GET", "/v1/quotes/fee?amount=1000", Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["token"], "GAF");
    assert_eq!(quote["fee_bps"], 50);
    assert_eq!(quote["fee"], 5);
    assert_eq!(quote["net_amount"], 995);

    let (status, _) = call(&app, "GET", "/v1/quotes/fee?amount=0", Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_conversion_quote() {
    let app = test_app();
    let parties = Parties::new();
    let (status, quote) = call(
        &app,
        "GET",
        "/v1/quotes/convert?from=usd&to=usdt&amount=1500",
        Some(&parties.buyer()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{quote}");
    assert_eq!(quote["from"], "USD");
    assert_eq!(quote["to"], "USDT");
    assert_eq!(quote["converted"], 1500);

    let (status, body) = call(
        &app,
        "GET",
        "/v1/quotes/convert?from=USD&to=EUR&amount=1",
        Some(&parties.buyer()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, rates) = call(&app, "GET", "/v1/quotes/rates", Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(rates
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["currency"] == "UGX"));
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_system_role_cannot_be_asserted() {
    let app = test_app();
    let token = format!("system:{}:x", Uuid::new_v4());
    let (status, _) = call(&app, "GET", "/v1/orders", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_shared_secret_is_enforced() {
    let app = test_app_with_secret("s3cret");
    let actor = Uuid::new_v4();

    let (status, _) = call(&app, "GET", "/v1/orders", Some(&format!("buyer:{actor}:wrong")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/v1/orders", Some(&format!("buyer:{actor}:s3cret")), None).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Operational Endpoints ----------------------------------------------------

#[tokio::test]
async fn test_health_probes_need_no_auth() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = call(&app, "GET", "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ready");
}

/// The process-wide Prometheus recorder, installed once per test binary.
fn prometheus() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| PrometheusBuilder::new().install_recorder().unwrap())
        .clone()
}

#[tokio::test]
async fn test_metrics_render_request_counters() {
    let (state, _ledger) = bootstrap(AppConfig::default(), None, Some(prometheus())).unwrap();
    let app = gafx_api::app(state);
    let parties = Parties::new();
    call(&app, "GET", "/v1/orders", Some(&parties.buyer()), None).await;
    call(&app, "GET", &format!("/v1/orders/{}", Uuid::new_v4()), Some(&parties.buyer()), None).await;

    let (status, body) = call(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    let not_found = text.lines().find(|l| {
        l.starts_with("http_requests_total{")
            && l.contains("route=\"/v1/orders/{id}\"")
            && l.contains("status=\"404\"")
    });
    assert!(not_found.is_some(), "{text}");
    assert!(text.contains("route=\"/v1/orders\""), "{text}");
}

#[tokio::test]
async fn test_metrics_empty_without_recorder() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_openapi_document_lists_lifecycle_paths() {
    let app = test_app();
    let parties = Parties::new();
    let (status, doc) = call(&app, "GET", "/openapi.json", Some(&parties.buyer()), None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = doc["paths"].as_object().unwrap();
    for path in [
        "/v1/orders",
        "/v1/orders/{id}/mark-paid",
        "/v1/orders/{id}/release",
        "/v1/orders/{id}/messages",
        "/v1/disputes",
        "/v1/quotes/fee",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}
