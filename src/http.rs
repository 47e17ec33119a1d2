//! HTTP API
//!
//! | route              | handler                                   |
//! |--------------------|-------------------------------------------|
//! | `POST /mint`       | payment-gated agent mint                  |
//! | `GET /credits`     | reconciled credit view of `?address=`     |
//! | `GET /mint-price`  | current price from the payment contract   |
//! | `GET /healthz`     | liveness                                  |
//! | `GET /metrics`     | Prometheus text exposition                |
//!
//! Every body is JSON except `/metrics`. Domain failures come back as a
//! structured [`MintResponse`] with an `error` tag; infrastructure failures
//! map to 5xx.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        MatchedPath, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::agent::DriverError;
use crate::chain::{
    format_address, format_ether, parse_address, Address, ChainError, PaymentReads, U256,
};
use crate::credits::ReadSource;
use crate::metrics::{self, HTTP_REQUESTS_TOTAL};
use crate::mint::{
    MintError, MintRequest, MintResponse, MintService, BACKEND_UNAVAILABLE, NO_CREDITS, RUN_TIMEOUT,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub mint: Arc<MintService>,
    /// Payment contract reads through the primary RPC endpoint
    pub payment: Arc<dyn PaymentReads>,
    /// The same reads through the fallback endpoint
    pub fallback_payment: Arc<dyn PaymentReads>,
    pub payment_address: Address,
}

impl AppState {
    /// Mint price from the primary endpoint, else from the fallback
    async fn mint_price(&self) -> Result<U256, ChainError> {
        match self.payment.mint_price().await {
            Ok(price) => Ok(price),
            Err(e) => {
                warn!(error = %e, "Primary mint price read failed, using fallback");
                self.fallback_payment.mint_price().await
            }
        }
    }
}

/// Body of `GET /credits`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub success: bool,
    pub user_address: String,
    pub can_mint: bool,
    #[serde(with = "crate::codec::decimal")]
    pub paid_token_count: u64,
    #[serde(with = "crate::codec::decimal")]
    pub mint_price: U256,
    pub source: ReadSource,
}

/// Body of `GET /mint-price`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintPriceResponse {
    #[serde(with = "crate::codec::decimal")]
    pub mint_price: U256,
    pub mint_price_eth: String,
    pub contract_address: String,
}

#[derive(Debug, Deserialize)]
pub struct CreditsQuery {
    pub address: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/mint", post(mint))
        .route("/credits", get(credits))
        .route("/mint-price", get(mint_price))
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        .route_layer(middleware::from_fn(record_status))
        .with_state(state)
}

async fn record_status(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    response
}

/// JSON error body used outside of `/mint` results
fn error_body(status: StatusCode, tag: &str, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": tag,
            "message": message.to_string(),
        })),
    )
        .into_response()
}

/// Status code of a structured mint result
pub fn status_for(response: &MintResponse) -> StatusCode {
    match response.error.as_deref() {
        None if response.success => StatusCode::OK,
        Some(NO_CREDITS) => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn driver_status(error: &DriverError) -> (StatusCode, &'static str) {
    match error {
        DriverError::Transport { .. } => (StatusCode::BAD_GATEWAY, BACKEND_UNAVAILABLE),
        DriverError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, RUN_TIMEOUT),
    }
}

impl IntoResponse for MintError {
    fn into_response(self) -> Response {
        let (status, tag) = match &self {
            MintError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
            MintError::Credits(_) => (StatusCode::SERVICE_UNAVAILABLE, "CREDITS_UNAVAILABLE"),
            MintError::Session(_) => (StatusCode::BAD_GATEWAY, BACKEND_UNAVAILABLE),
            MintError::Driver(e) | MintError::Interrupted { source: e, .. } => driver_status(e),
        };
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "Mint request failed");
        }
        match self {
            // The structured body still carries whatever the mint produced
            MintError::Interrupted { response, .. } => (status, Json(*response)).into_response(),
            other => error_body(status, tag, other),
        }
    }
}

async fn mint(
    State(state): State<AppState>,
    body: Result<Json<MintRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_body(rejection.status(), "INVALID_REQUEST", rejection.body_text()),
    };

    match state.mint.mint(request).await {
        Ok(response) => (status_for(&response), Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn credits(
    State(state): State<AppState>,
    query: Result<Query<CreditsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_body(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text()),
    };
    let user = match parse_address(query.address.trim()) {
        Ok(user) => user,
        Err(_) => return MintError::InvalidAddress(query.address).into_response(),
    };

    let view = match state.mint.credits().reconcile(&user).await {
        Ok(view) => view,
        Err(e) => return MintError::Credits(e).into_response(),
    };
    let price = match state.mint_price().await {
        Ok(price) => price,
        Err(e) => return error_body(StatusCode::BAD_GATEWAY, "RPC_UNAVAILABLE", e),
    };

    Json(CreditsResponse {
        success: true,
        user_address: format_address(&user),
        can_mint: view.can_mint,
        paid_token_count: view.credits,
        mint_price: price,
        source: view.source,
    })
    .into_response()
}

async fn mint_price(State(state): State<AppState>) -> Response {
    match state.mint_price().await {
        Ok(price) => Json(MintPriceResponse {
            mint_price: price,
            mint_price_eth: format_ether(price),
            contract_address: format_address(&state.payment_address),
        })
        .into_response(),
        Err(e) => error_body(StatusCode::BAD_GATEWAY, "RPC_UNAVAILABLE", e),
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn prometheus_metrics() -> Response {
    match metrics::gather_text() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, "METRICS_UNAVAILABLE", e),
    }
}
