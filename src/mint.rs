//! Mint service: one HTTP mint request end to end
//!
//! ```text
//! MintRequest
//!   │ validate address
//!   │ reconcile credits ── can_mint == false ─► NO_CREDITS
//!   │ theme + prompt
//!   │ open session ─► start run ─► perform_run (fresh MintState)
//!   │ outcome: structured mint result ─► decoded prose ─► failure tag
//!   └ mint attempted? ─► reconcile_after_mint, attach credits
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{
    DriverError, RunDriver, RunResult, SessionError, SessionManager, MINTING_ALREADY_COMPLETED,
};
use crate::assistant::RunStatus;
use crate::chain::{format_address, parse_address, Address};
use crate::credits::{CreditError, CreditReconciler, CreditView};
use crate::metrics::MINT_REQUESTS_TOTAL;
use crate::prompt::{build_prompt, select_theme, PromptSeed, Rarity, Theme};
use crate::response::{decode, Verdict};

pub const NO_CREDITS: &str = "NO_CREDITS";
pub const MINTING_FAILED: &str = "MINTING_FAILED";
pub const MINTING_LIMIT_REACHED: &str = "MINTING_LIMIT_REACHED";
pub const AGENT_FAILURE: &str = "AGENT_FAILURE";
pub const BACKEND_UNAVAILABLE: &str = "BACKEND_UNAVAILABLE";
pub const RUN_TIMEOUT: &str = "RUN_TIMEOUT";

/// Body of `POST /mint`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub wallet_address: String,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub rarity: Option<Rarity>,
}

/// Response of `POST /mint`; `error` carries the failure tag
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub success: bool,
    pub wallet_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<CreditView>,
}

impl MintResponse {
    fn failure(wallet: &str, tag: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            wallet_address: wallet.to_string(),
            message: Some(message.into()),
            error: Some(tag.to_string()),
            ..Default::default()
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Error type for mint requests that could not be carried out at all
#[derive(Debug)]
pub enum MintError {
    /// Wallet address is not `0x` + 40 hex characters
    InvalidAddress(String),
    /// Credits could not be read from either path
    Credits(CreditError),
    /// Session or run could not be created
    Session(SessionError),
    /// Run could not be driven to completion
    Driver(DriverError),
    /// Run was abandoned after its mint call had already executed
    Interrupted {
        source: DriverError,
        response: Box<MintResponse>,
    },
}

impl std::fmt::Display for MintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MintError::InvalidAddress(raw) => write!(f, "Invalid wallet address: {}", raw),
            MintError::Credits(e) => write!(f, "{}", e),
            MintError::Session(e) => write!(f, "{}", e),
            MintError::Driver(e) => write!(f, "{}", e),
            MintError::Interrupted { source, .. } => write!(f, "{} (after mint)", source),
        }
    }
}

impl std::error::Error for MintError {}

impl From<CreditError> for MintError {
    fn from(e: CreditError) -> Self {
        MintError::Credits(e)
    }
}

impl From<SessionError> for MintError {
    fn from(e: SessionError) -> Self {
        MintError::Session(e)
    }
}

impl From<DriverError> for MintError {
    fn from(e: DriverError) -> Self {
        MintError::Driver(e)
    }
}

/// Orchestrates payment gate, agent run and credit refresh for one request
pub struct MintService {
    sessions: Arc<SessionManager>,
    driver: Arc<RunDriver>,
    credits: Arc<CreditReconciler>,
}

impl MintService {
    pub fn new(
        sessions: Arc<SessionManager>,
        driver: Arc<RunDriver>,
        credits: Arc<CreditReconciler>,
    ) -> Self {
        Self {
            sessions,
            driver,
            credits,
        }
    }

    pub fn credits(&self) -> &CreditReconciler {
        &self.credits
    }

    /// Handle one mint request
    pub async fn mint(&self, request: MintRequest) -> Result<MintResponse, MintError> {
        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "mint_request",
            trace_id = %trace_id,
            wallet = %request.wallet_address,
            otel.name = "mint_request"
        );

        async {
            println!("[MINT] Trace ID: {}", trace_id);
            let result = self.mint_inner(&request).await;
            let outcome = match &result {
                Ok(response) => response.error.as_deref().unwrap_or("success"),
                Err(_) => "error",
            };
            MINT_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
            result
        }
        .instrument(span)
        .await
    }

    async fn mint_inner(&self, request: &MintRequest) -> Result<MintResponse, MintError> {
        let raw_wallet = request.wallet_address.trim();
        let wallet = parse_address(raw_wallet)
            .map_err(|_| MintError::InvalidAddress(request.wallet_address.clone()))?;
        let wallet_hex = format_address(&wallet);

        let credits = self.credits.reconcile(&wallet).await?;
        if !credits.can_mint {
            info!(source = credits.source.as_str(), "Mint refused, no credits");
            let mut response = MintResponse::failure(
                &wallet_hex,
                NO_CREDITS,
                "No minting credits available. Pay the mint price first.",
            );
            response.credits = Some(credits);
            return Ok(response);
        }

        let theme = select_theme(request.theme, raw_wallet);
        let rarity = request.rarity.unwrap_or_default();
        info!(theme = theme.as_str(), rarity = rarity.as_str(), "Building task");
        let task = build_prompt(theme, rarity, &wallet_hex, PromptSeed::random());

        let assistant_id = self.sessions.assistant_id().await?;
        let session = self.sessions.open(&task).await?;
        let run = self.sessions.start_run(&session, &assistant_id).await?;
        let result = match self.driver.perform_run(&session, run).await {
            Ok(result) => result,
            Err(e) if e.report().mint_attempted() => {
                warn!(error = %e, "Run abandoned after its mint call");
                let mut response = interrupted_response(&wallet_hex, &e);
                response.credits = self.refresh_after_mint(&wallet).await;
                return Err(MintError::Interrupted {
                    source: e,
                    response: Box::new(response),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut response = assemble_response(&wallet_hex, &result);
        if result.report.mint_attempted() {
            response.credits = self.refresh_after_mint(&wallet).await;
        }

        Ok(response)
    }

    async fn refresh_after_mint(&self, wallet: &Address) -> Option<CreditView> {
        match self.credits.reconcile_after_mint(wallet).await {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(error = %e, "Credit refresh after mint failed");
                None
            }
        }
    }
}

/// Response body for a run abandoned after its mint call
///
/// Whatever the mint call produced is kept, so a token that is already on
/// chain is still reported to the caller.
pub fn interrupted_response(wallet: &str, error: &DriverError) -> MintResponse {
    let tag = match error {
        DriverError::Transport { .. } => BACKEND_UNAVAILABLE,
        DriverError::Timeout { .. } => RUN_TIMEOUT,
    };
    let report = error.report();

    match &report.mint_result {
        Some(mint) => MintResponse {
            transaction_hash: Some(mint.transaction_hash.clone()),
            block_number: Some(mint.block_number.to_string()),
            image_url: report
                .image_url
                .clone()
                .or_else(|| Some(mint.original_image_url.clone())),
            metadata_hash: Some(mint.metadata_ipfs_hash.clone()),
            ..MintResponse::failure(wallet, tag, "NFT minted, but the agent run could not be finished")
                .with_details(error.to_string())
        },
        None => MintResponse::failure(wallet, tag, "Minting was attempted, but the agent run could not be finished")
            .with_details(format!(
                "{}\n\n{}",
                report.mint_error.as_deref().unwrap_or_default(),
                error
            )),
    }
}

/// Turn a finished run into the response body
///
/// Structured tool results are trusted first; the prose decoder only fills
/// in when the run produced none.
pub fn assemble_response(wallet: &str, result: &RunResult) -> MintResponse {
    let text = result.text();
    let report = &result.report;

    if let Some(mint) = &report.mint_result {
        return MintResponse {
            success: true,
            wallet_address: wallet.to_string(),
            transaction_hash: Some(mint.transaction_hash.clone()),
            block_number: Some(mint.block_number.to_string()),
            image_url: report
                .image_url
                .clone()
                .or_else(|| Some(mint.original_image_url.clone())),
            metadata_hash: Some(mint.metadata_ipfs_hash.clone()),
            message: Some("NFT created and minted successfully!".to_string()),
            details: Some(text.to_string()),
            ..Default::default()
        };
    }

    if let Some(error) = &report.mint_error {
        return MintResponse::failure(wallet, MINTING_FAILED, "Minting failed")
            .with_details(format!("{}\n\n{}", error, text));
    }

    if result.status != RunStatus::Completed {
        return MintResponse::failure(wallet, AGENT_FAILURE, text).with_details(text);
    }

    if text.contains(MINTING_ALREADY_COMPLETED) {
        return MintResponse::failure(
            wallet,
            MINTING_ALREADY_COMPLETED,
            "An NFT was already minted in this run",
        )
        .with_details(text);
    }

    let decoded = decode(text);
    match decoded.verdict {
        Verdict::LimitReached => MintResponse::failure(
            wallet,
            MINTING_LIMIT_REACHED,
            "This wallet has already minted the maximum number of NFTs allowed.",
        )
        .with_details(text),
        Verdict::Failure => MintResponse::failure(wallet, MINTING_FAILED, "Minting failed").with_details(text),
        Verdict::Success => MintResponse {
            success: true,
            wallet_address: wallet.to_string(),
            transaction_hash: decoded.transaction_hash,
            block_number: decoded.block_number,
            image_url: decoded.image_url.or_else(|| report.image_url.clone()),
            metadata_hash: decoded.metadata_hash,
            message: Some("NFT created and minted successfully!".to_string()),
            details: Some(text.to_string()),
            ..Default::default()
        },
        Verdict::Unknown => MintResponse::failure(
            wallet,
            AGENT_FAILURE,
            "The agent did not complete the minting workflow",
        )
        .with_details(text),
    }
}
