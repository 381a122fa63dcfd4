//! HTTP API tests against in-memory components.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gatepass_admission::{AdmissionController, AdmissionPolicy, StaticGatekeepers};
use gatepass_core::environment::Clock;
use gatepass_core::store::PurchaseStore;
use gatepass_core::{
    Address, EventKind, LedgerTicket, LedgerTicketState, PurchaseRecord, PurchaseStatus, TicketId,
};
use gatepass_indexer::{Indexer, IndexerConfig};
use gatepass_server::{AppState, build_router};
use gatepass_testing::{InMemoryLedger, InMemoryStore, ManualClock, fixtures, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const EVENT: &str = "Summer Fest";

struct Harness {
    ledger: InMemoryLedger,
    store: Arc<InMemoryStore>,
    clock: ManualClock,
    indexer: Arc<Indexer>,
    app: Router,
}

fn holder() -> Address {
    fixtures::address(0xb1)
}

fn gatekeeper() -> Address {
    fixtures::address(0xe1)
}

fn harness() -> Harness {
    let ledger = InMemoryLedger::new();
    let store = Arc::new(InMemoryStore::new());
    let clock = test_clock();

    let indexer = Arc::new(Indexer::new(
        Arc::new(ledger.clone()),
        store.clone(),
        Arc::new(clock.clone()),
        IndexerConfig::default(),
    ));
    let admission = Arc::new(AdmissionController::new(
        store.clone(),
        Arc::new(StaticGatekeepers::new().allow(EVENT, gatekeeper())),
        Arc::new(clock.clone()),
        AdmissionPolicy::default(),
    ));
    let app = build_router(AppState::new(admission, indexer.clone(), store.clone()));

    Harness {
        ledger,
        store,
        clock,
        indexer,
        app,
    }
}

async fn sell(h: &Harness, ticket: u64) -> PurchaseRecord {
    let record = PurchaseRecord::new(
        TicketId::new(ticket),
        fixtures::tx(0x1000 + ticket),
        holder(),
        EVENT,
        h.clock.now(),
    );
    h.store.insert(record.clone()).await.unwrap();
    record
}

fn scan_body(h: &Harness, ticket: u64) -> Value {
    let payload = json!({
        "ticketId": ticket,
        "owner": holder(),
        "eventName": EVENT,
        "timestamp": h.clock.now().timestamp(),
    });
    json!({
        "qrPayload": payload.to_string(),
        "gatekeeper": gatekeeper(),
        "location": "Gate 3",
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = h.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_version() {
    let h = harness();
    let (status, body) = send(&h, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn readiness_follows_the_indexer_loop() {
    let h = harness();
    let (status, body) = send(&h, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["indexer"], false);

    h.indexer.start().await.unwrap();
    let (status, body) = send(&h, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    h.indexer.stop().await.unwrap();
}

#[tokio::test]
async fn scan_admits_then_flags_duplicate() {
    let h = harness();
    sell(&h, 42).await;

    let (status, body) = send(&h, post("/api/scan", &scan_body(&h, 42))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "ADMIT");
    assert_eq!(body["retryable"], false);

    h.clock.advance(chrono::Duration::seconds(20));
    let (status, body) = send(&h, post("/api/scan", &scan_body(&h, 42))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "DUPLICATE");
    assert!(body["conflictingRecord"].is_object());

    let locations: Vec<_> = h
        .store
        .entries()
        .iter()
        .map(|e| e.location.clone())
        .collect();
    assert_eq!(locations, vec![Some("Gate 3".to_string()); 2]);
}

#[tokio::test]
async fn unreadable_payload_is_an_invalid_decision() {
    let h = harness();
    let body = json!({ "qrPayload": "not a credential", "gatekeeper": gatekeeper() });

    let (status, body) = send(&h, post("/api/scan", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "INVALID");
    assert!(h.store.entries().is_empty());
}

#[tokio::test]
async fn malformed_gatekeeper_is_a_bad_request() {
    let h = harness();
    let mut body = scan_body(&h, 42);
    body["gatekeeper"] = json!("gate-3");

    let (status, body) = send(&h, post("/api/scan", &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn entry_log_outage_is_retryable() {
    let h = harness();
    sell(&h, 42).await;
    h.store.set_entry_log_down(true);

    let (status, body) = send(&h, post("/api/scan", &scan_body(&h, 42))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["decision"], "INVALID");
    assert_eq!(body["retryable"], true);

    let (status, body) = send(&h, get("/api/tickets/42/entries")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn entries_and_guest_list_are_readable() {
    let h = harness();
    sell(&h, 42).await;
    sell(&h, 43).await;
    send(&h, post("/api/scan", &scan_body(&h, 42))).await;
    h.clock.advance(chrono::Duration::hours(1));
    send(&h, post("/api/scan", &scan_body(&h, 42))).await;
    send(&h, post("/api/scan", &scan_body(&h, 43))).await;

    let (status, body) = send(&h, get("/api/tickets/42/entries")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticket_id"], 42);
    let results: Vec<_> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["scan_result"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(results, vec!["SUCCESS", "ALREADY_USED"]);

    let (status, body) = send(&h, get("/api/events/Summer%20Fest/guests")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_name"], EVENT);
    assert_eq!(body["admitted"], 2);

    let (status, _) = send(&h, get("/api/tickets/not-a-number/entries")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn buyer_purchases_are_listed() {
    let h = harness();
    sell(&h, 42).await;

    let uri = format!("/api/buyers/{}/purchases", holder().as_str().to_uppercase().replace("0X", "0x"));
    let (status, body) = send(&h, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buyer"], holder().as_str());
    assert_eq!(body["purchases"].as_array().unwrap().len(), 1);

    let (status, _) = send(&h, get("/api/buyers/nobody/purchases")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn indexer_status_is_reported() {
    let h = harness();
    let (status, body) = send(&h, get("/api/indexer/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert!(body["last_processed_block"].is_null());
    assert_eq!(body["ledger_endpoint"], "memory://ledger");
}

#[tokio::test]
async fn rescan_applies_events_in_range() {
    let h = harness();
    sell(&h, 4).await;
    h.ledger.push_event(fixtures::event(
        EventKind::Downloaded,
        4,
        fixtures::tx(0x41),
        0xb1,
        20,
        0,
    ));

    let (status, body) = send(&h, post("/api/indexer/rescan", &json!({ "from": 1, "to": 20 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], 1);
    assert_eq!(body["malformed"], 0);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Downloaded);
    assert!(h.store.cursor().is_none());

    let (status, body) = send(&h, post("/api/indexer/rescan", &json!({ "from": 20, "to": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn refresh_moves_owner_records_forward() {
    let h = harness();
    sell(&h, 5).await;
    h.ledger.set_ticket(LedgerTicket {
        ticket_id: TicketId::new(5),
        owner: holder(),
        price: 1_000,
        state: LedgerTicketState::Refunded,
    });

    let (status, body) = send(&h, post("/api/tickets/5/refresh", &json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], 1);
    assert_eq!(h.store.purchases()[0].status, PurchaseStatus::Refunded);
}

#[tokio::test]
async fn refresh_with_ledger_down_is_unavailable() {
    let h = harness();
    h.ledger.set_available(false);

    let (status, body) = send(&h, post("/api/tickets/5/refresh", &json!({}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}
