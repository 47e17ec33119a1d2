//! Tools the agent can call during a run
//!
//! Each tool is a [`ToolHandler`]: a JSON schema advertised to the agent plus
//! an async function from parsed arguments to a JSON result. Names are the
//! wire contract with the agent and must match the assistant's tool
//! definitions exactly.
//!
//! | name                 | module      |
//! |----------------------|-------------|
//! | `generate-image`     | [`image`]   |
//! | `mint-and-upload`    | [`mint`]    |
//! | `use-minting-credit` | [`payment`] |
//! | `check-payment`      | [`payment`] |
//! | `get-balance`        | [`wallet`]  |
//! | `get-nft-balance`    | [`wallet`]  |
//! | `get-wallet-address` | [`wallet`]  |

pub mod image;
pub mod mint;
pub mod payment;
pub mod wallet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::assistant::{BackendError, ToolDefinition};
use crate::chain::{Address, ChainError};
use crate::ipfs::PinningError;

pub use image::{GenerateImageTool, ImageGenerator};
pub use mint::{MintAndUploadResult, MintAndUploadTool};
pub use payment::{CheckPaymentTool, UseMintingCreditTool};
pub use wallet::{GetBalanceTool, GetNftBalanceTool, GetWalletAddressTool};

/// Error type for tool handlers
///
/// The dispatcher never propagates these: they become an `"Error: ..."`
/// output the agent can read.
#[derive(Debug)]
pub enum ToolError {
    /// Arguments were not valid JSON or did not match the schema
    InvalidArguments(String),
    /// Image generation failed
    Backend(BackendError),
    /// Chain read or write failed
    Chain(ChainError),
    /// Pinning failed
    Pinning(PinningError),
    /// Handler-specific failure, shown to the agent as is
    Failed(String),
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            ToolError::Backend(e) => write!(f, "{}", e),
            ToolError::Chain(e) => write!(f, "{}", e),
            ToolError::Pinning(e) => write!(f, "{}", e),
            ToolError::Failed(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<BackendError> for ToolError {
    fn from(e: BackendError) -> Self {
        ToolError::Backend(e)
    }
}

impl From<ChainError> for ToolError {
    fn from(e: ChainError) -> Self {
        ToolError::Chain(e)
    }
}

impl From<PinningError> for ToolError {
    fn from(e: PinningError) -> Self {
        ToolError::Pinning(e)
    }
}

/// A callable tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Wire name of the tool
    fn name(&self) -> &'static str;

    /// Schema advertised to the agent
    fn definition(&self) -> ToolDefinition;

    /// Execute with already-parsed JSON arguments
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Deserialize tool arguments into a typed struct
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Parse an address argument, naming the field on failure
pub fn address_arg(raw: &str, field: &str) -> Result<Address, ToolError> {
    crate::chain::parse_address(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("{}: {}", field, e)))
}
