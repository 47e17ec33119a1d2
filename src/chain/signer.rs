//! Transaction signing
//!
//! The agent wallet signs mint and credit transactions with a local
//! secp256k1 key.

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::SigningKey;

use super::ChainError;

/// `(y_parity, r, s)` of a recoverable ECDSA signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub y_parity: u8,
    pub r: U256,
    pub s: U256,
}

/// Anything that can sign a 32-byte transaction hash for one address
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature, ChainError>;
}

/// Signer backed by an in-process private key
pub struct LocalKeySigner {
    key: SigningKey,
    address: Address,
}

impl LocalKeySigner {
    /// Build from a hex private key, with or without `0x`
    pub fn from_hex(raw: &str) -> Result<Self, ChainError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| ChainError::Signer(format!("private key is not hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ChainError::Signer(format!("invalid private key: {}", e)))?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }
}

fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    // Drop the 0x04 prefix, hash the 64-byte public key, keep the low 20 bytes
    let digest = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&digest[12..])
}

impl TransactionSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &B256) -> Result<RecoverableSignature, ChainError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| ChainError::Signer(e.to_string()))?;
        let bytes = signature.to_bytes();
        Ok(RecoverableSignature {
            y_parity: recovery_id.to_byte(),
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
        })
    }
}
