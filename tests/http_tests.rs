//! HTTP handler tests through the full router

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{Reading, ScriptedBackend, StubCreditReader, StubPaymentReads};
use mintforge::agent::{DriverConfig, RunDriver, SessionManager, ToolDispatcher};
use mintforge::assistant::AssistantSpec;
use mintforge::chain::{Address, CreditRecord, U256};
use mintforge::credits::{CreditReconciler, ReconcileConfig};
use mintforge::http::{create_router, AppState};
use mintforge::mint::MintService;

const WALLET: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn priced_reads() -> StubPaymentReads {
    StubPaymentReads::new(
        U256::from(10_000_000_000_000_000u64),
        CreditRecord {
            can_mint: false,
            paid_token_count: 0,
        },
    )
}

fn app(backend: ScriptedBackend, primary: Reading, fallback: Reading) -> Router {
    app_with_payment(backend, primary, fallback, priced_reads(), priced_reads())
}

fn app_with_payment(
    backend: ScriptedBackend,
    primary: Reading,
    fallback: Reading,
    payment: StubPaymentReads,
    fallback_payment: StubPaymentReads,
) -> Router {
    let backend = Arc::new(backend);
    let spec = AssistantSpec {
        model: "gpt-4o-mini".into(),
        name: "Minter".into(),
        instructions: "mint".into(),
        tools: Vec::new(),
    };
    let sessions = Arc::new(SessionManager::new(backend.clone(), spec));
    let driver = Arc::new(RunDriver::new(
        backend,
        Arc::new(ToolDispatcher::new()),
        DriverConfig::default(),
    ));
    let credits = Arc::new(CreditReconciler::new(
        Arc::new(StubCreditReader::always(primary)),
        Arc::new(StubCreditReader::always(fallback)),
        ReconcileConfig::default(),
    ));

    create_router(AppState {
        mint: Arc::new(MintService::new(sessions, driver, credits)),
        payment: Arc::new(payment),
        fallback_payment: Arc::new(fallback_payment),
        payment_address: Address::repeat_byte(0xbb),
    })
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post_mint(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mint")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(0), Reading::Down);
    let (status, body) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_mint_without_credits_is_payment_required() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(0), Reading::Down);
    let (status, body) = send(app, post_mint(json!({"walletAddress": WALLET}))).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "NO_CREDITS");
    assert_eq!(body["credits"]["credits"], "0");
}

#[tokio::test]
async fn test_mint_with_invalid_address_is_bad_request() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(1), Reading::Down);
    let (status, body) = send(app, post_mint(json!({"walletAddress": "0x1234"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_ADDRESS");
}

#[tokio::test]
async fn test_mint_with_malformed_body_is_json_error() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(1), Reading::Down);
    let (status, body) = send(app, post_mint(json!({"wallet": WALLET}))).await;

    assert!(status.is_client_error());
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_mint_when_credits_unreadable_is_unavailable() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Down, Reading::Down);
    let (status, body) = send(app, post_mint(json!({"walletAddress": WALLET}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "CREDITS_UNAVAILABLE");
}

#[tokio::test]
async fn test_mint_when_run_cannot_start_is_bad_gateway() {
    let backend = ScriptedBackend::new(Vec::new()).with_run_start_failure();
    let app = app(backend, Reading::Credits(1), Reading::Down);
    let (status, body) = send(app, post_mint(json!({"walletAddress": WALLET}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn test_credits_reports_source_and_decimal_strings() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Empty, Reading::Credits(2));
    let (status, body) = send(app, get(&format!("/credits?address={}", WALLET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userAddress"], WALLET);
    assert_eq!(body["canMint"], true);
    assert_eq!(body["paidTokenCount"], "2");
    assert_eq!(body["mintPrice"], "10000000000000000");
    assert_eq!(body["source"], "fallback");
}

#[tokio::test]
async fn test_credits_with_primary_rpc_down_uses_fallback_price() {
    let app = app_with_payment(
        ScriptedBackend::new(Vec::new()),
        Reading::Down,
        Reading::Credits(2),
        StubPaymentReads::unavailable(),
        priced_reads(),
    );
    let (status, body) = send(app, get(&format!("/credits?address={}", WALLET))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paidTokenCount"], "2");
    assert_eq!(body["mintPrice"], "10000000000000000");
    assert_eq!(body["source"], "fallback");
}

#[tokio::test]
async fn test_mint_price_with_both_rpcs_down_is_bad_gateway() {
    let app = app_with_payment(
        ScriptedBackend::new(Vec::new()),
        Reading::Credits(1),
        Reading::Down,
        StubPaymentReads::unavailable(),
        StubPaymentReads::unavailable(),
    );
    let (status, body) = send(app, get("/mint-price")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "RPC_UNAVAILABLE");
}

#[tokio::test]
async fn test_credits_requires_address() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(1), Reading::Down);
    let (status, body) = send(app, get("/credits")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_mint_price() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(1), Reading::Down);
    let (status, body) = send(app, get("/mint-price")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mintPrice"], "10000000000000000");
    assert_eq!(body["mintPriceEth"], "0.01");
    assert_eq!(body["contractAddress"], format!("0x{}", "bb".repeat(20)));
}

#[tokio::test]
async fn test_metrics_exposition() {
    let app = app(ScriptedBackend::new(Vec::new()), Reading::Credits(1), Reading::Down);
    let _ = send(app.clone(), get("/healthz")).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("mintforge_http_requests_total"));
}
