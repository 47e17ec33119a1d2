//! Service configuration from environment variables
//!
//! Every missing required variable is reported in one error so a
//! misconfigured deployment can be fixed in one pass.

use std::net::SocketAddr;
use std::time::Duration;

use crate::agent::DriverConfig;
use crate::assistant::client::DEFAULT_OPENAI_BASE_URL;
use crate::chain::{parse_address, Address};
use crate::credits::ReconcileConfig;
use crate::ipfs::{PinningAuth, DEFAULT_GATEWAY_URL, DEFAULT_PINNING_BASE_URL};

/// Public Shape Sepolia endpoint
pub const DEFAULT_RPC_URL: &str = "https://sepolia.shape.network";

/// Shape Sepolia chain id
pub const DEFAULT_CHAIN_ID: u64 = 11011;

/// Error type for configuration loading
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Required variables that are unset or empty
    Missing(Vec<String>),
    /// A variable is set but unparseable
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(keys) => {
                write!(f, "Missing required environment variables: {}", keys.join(", "))
            }
            ConfigError::Invalid { key, message } => write!(f, "Invalid {}: {}", key, message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full service configuration
#[derive(Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub assistant_model: String,
    pub image_model: String,
    /// Reuse an existing assistant instead of creating one at first request
    pub assistant_id: Option<String>,
    pub pinning_auth: PinningAuth,
    pub pinning_base_url: String,
    pub gateway_url: String,
    pub private_key: String,
    pub rpc_url: String,
    pub fallback_rpc_url: String,
    pub chain_id: u64,
    pub nft_contract: Address,
    pub payment_contract: Address,
    pub driver: DriverConfig,
    pub reconcile: ReconcileConfig,
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,
    pub otlp_endpoint: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_base_url", &self.openai_base_url)
            .field("assistant_model", &self.assistant_model)
            .field("image_model", &self.image_model)
            .field("rpc_url", &self.rpc_url)
            .field("fallback_rpc_url", &self.fallback_rpc_url)
            .field("chain_id", &self.chain_id)
            .field("nft_contract", &self.nft_contract)
            .field("payment_contract", &self.payment_contract)
            .field("driver", &self.driver)
            .field("reconcile", &self.reconcile)
            .field("bind_addr", &self.bind_addr)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut missing = Vec::new();
        let mut require = |key: &str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let openai_api_key = require("OPENAI_API_KEY");
        let private_key = require("PRIVATE_KEY");
        let nft_contract_raw = require("NFT_CONTRACT_ADDRESS");
        let payment_contract_raw = require("PAYMENT_CONTRACT_ADDRESS");

        let pinning_auth = match (get("PINATA_JWT"), get("PINATA_API_KEY"), get("PINATA_API_SECRET")) {
            (Some(jwt), _, _) => Some(PinningAuth::Jwt(jwt)),
            (None, Some(key), Some(secret)) => Some(PinningAuth::ApiKey { key, secret }),
            (None, key, secret) => {
                if key.is_none() {
                    missing.push("PINATA_API_KEY".to_string());
                }
                if secret.is_none() {
                    missing.push("PINATA_API_SECRET".to_string());
                }
                None
            }
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let pinning_auth = pinning_auth.ok_or_else(|| ConfigError::Missing(vec!["PINATA_JWT".to_string()]))?;

        let rpc_url = get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let driver_defaults = DriverConfig::default();
        let reconcile_defaults = ReconcileConfig::default();

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            assistant_model: get("ASSISTANT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            image_model: get("IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string()),
            assistant_id: get("ASSISTANT_ID"),
            pinning_auth,
            pinning_base_url: get("PINATA_BASE_URL").unwrap_or_else(|| DEFAULT_PINNING_BASE_URL.to_string()),
            gateway_url: get("IPFS_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            private_key,
            fallback_rpc_url: get("FALLBACK_RPC_URL").unwrap_or_else(|| rpc_url.clone()),
            rpc_url,
            chain_id: parse_or("CHAIN_ID", get("CHAIN_ID"), DEFAULT_CHAIN_ID)?,
            nft_contract: address("NFT_CONTRACT_ADDRESS", &nft_contract_raw)?,
            payment_contract: address("PAYMENT_CONTRACT_ADDRESS", &payment_contract_raw)?,
            driver: DriverConfig {
                poll_interval: Duration::from_millis(parse_or(
                    "POLL_INTERVAL_MS",
                    get("POLL_INTERVAL_MS"),
                    driver_defaults.poll_interval.as_millis() as u64,
                )?),
                max_polls: parse_or("MAX_POLLS", get("MAX_POLLS"), driver_defaults.max_polls)?,
            },
            reconcile: ReconcileConfig {
                attempts: parse_or(
                    "RECONCILE_ATTEMPTS",
                    get("RECONCILE_ATTEMPTS"),
                    reconcile_defaults.attempts,
                )?,
                backoff_unit: Duration::from_millis(parse_or(
                    "RECONCILE_UNIT_MS",
                    get("RECONCILE_UNIT_MS"),
                    reconcile_defaults.backoff_unit.as_millis() as u64,
                )?),
                freshness: Duration::from_secs(parse_or(
                    "CREDIT_FRESHNESS_SECS",
                    get("CREDIT_FRESHNESS_SECS"),
                    reconcile_defaults.freshness.as_secs(),
                )?),
            },
            bind_addr: parse_or(
                "BIND_ADDR",
                get("BIND_ADDR"),
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            )?,
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"), 120)?),
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn address(key: &str, raw: &str) -> Result<Address, ConfigError> {
    parse_address(raw).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}
