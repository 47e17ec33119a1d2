//! EVM chain access for the payment and NFT collaborators
//!
//! Both contracts are external: this module only speaks their fixed ABI over
//! JSON-RPC.
//!
//! ```text
//! PaymentContract ──┐                       ┌─► eth_call (reads)
//!                   ├─► EvmRpcClient ───────┤
//! NftContract ──────┘        ▲              └─► eth_sendRawTransaction (writes)
//!                            │
//!              TransactionSender ◄── TransactionSigner (local key)
//! ```

pub mod abi;
pub mod contracts;
pub mod rpc;
pub mod signer;
pub mod transaction;

use std::str::FromStr;

pub use alloy_primitives::{Address, B256, U256};

pub use contracts::{CreditRecord, MintReceipt, NftContract, PaymentContract, PaymentReads};
pub use rpc::{BlockTag, EvmRpcClient, TransactionReceipt};
pub use signer::{LocalKeySigner, RecoverableSignature, TransactionSigner};
pub use transaction::TransactionSender;

/// Error type for chain operations
#[derive(Debug)]
pub enum ChainError {
    /// HTTP transport failure talking to the RPC node
    Transport(reqwest::Error),
    /// RPC node returned a JSON-RPC error object
    Rpc { method: String, message: String },
    /// Response or argument could not be decoded
    Decode(String),
    /// Signing failed or the key is invalid
    Signer(String),
    /// Transaction was mined but reverted
    Reverted { transaction_hash: String },
    /// Receipt did not appear in time
    ReceiptTimeout { transaction_hash: String },
    /// A write was requested on a read-only contract handle
    ReadOnly,
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Transport(e) => write!(f, "RPC transport error: {}", e),
            ChainError::Rpc { method, message } => write!(f, "{} failed: {}", method, message),
            ChainError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ChainError::Signer(msg) => write!(f, "Signer error: {}", msg),
            ChainError::Reverted { transaction_hash } => {
                write!(f, "Transaction {} reverted", transaction_hash)
            }
            ChainError::ReceiptTimeout { transaction_hash } => {
                write!(f, "Timed out waiting for receipt of {}", transaction_hash)
            }
            ChainError::ReadOnly => write!(f, "No signer configured for contract writes"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::Transport(e)
    }
}

/// Parse a `0x`-prefixed 20-byte address
pub fn parse_address(raw: &str) -> Result<Address, ChainError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ChainError::Decode(format!("address must start with 0x: {}", raw)))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainError::Decode(format!("invalid address: {}", raw)));
    }
    Address::from_str(&digits.to_ascii_lowercase())
        .map_err(|e| ChainError::Decode(format!("invalid address {}: {}", raw, e)))
}

/// Lowercase `0x` hex form of an address
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Format a wei amount as a decimal ether string without rounding
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(10u64).pow(U256::from(18u64));
    let whole = wei / unit;
    let fraction = wei % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>18}", fraction.to_string());
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}
