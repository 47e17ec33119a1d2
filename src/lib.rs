//! Mintforge - agent-driven, payment-gated NFT minting service
//!
//! A paying wallet holder asks for an NFT; an assistant run generates the
//! artwork, pins it with its metadata to IPFS and mints it on an EVM chain.
//! This crate is the orchestration core around that run.
//!
//! # Modules
//!
//! - `agent` - Run driver, tool dispatcher, mint guard and sessions
//! - `assistant` - Assistants-style conversational backend
//! - `chain` - EVM JSON-RPC, ABI encoding, local signing, contracts
//! - `tools` - Tool handlers the agent can call
//! - `ipfs` - Pinning service client
//! - `credits` - Credit reconciliation with fallback and retry
//! - `mint` - Per-request mint service
//! - `http` - axum API
//! - `config` - Environment configuration
//! - `metrics` - Prometheus metrics
//! - `tracing` - Logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use mintforge::{AppConfig, MintRequest};
//!
//! let config = AppConfig::from_env()?;
//! // ... build MintService (see main.rs)
//! let response = service.mint(MintRequest {
//!     wallet_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
//!     theme: None,
//!     rarity: None,
//! }).await?;
//! ```

pub mod agent;
pub mod assistant;
pub mod chain;
pub mod codec;
pub mod config;
pub mod credits;
pub mod http;
pub mod ipfs;
pub mod metrics;
pub mod mint;
pub mod prompt;
pub mod response;
pub mod tools;
pub mod tracing;

pub use agent::{RunDriver, SessionManager, ToolDispatcher};
pub use config::AppConfig;
pub use credits::CreditReconciler;
pub use mint::{MintRequest, MintResponse, MintService};
