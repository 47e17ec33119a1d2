//! Typed handles for the payment and NFT contracts

use std::sync::Arc;

use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::abi::{self, Token};
use super::rpc::{parse_hex_u256, BlockTag, EvmRpcClient, TransactionReceipt};
use super::transaction::TransactionSender;
use super::ChainError;

/// On-chain credit state of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRecord {
    pub can_mint: bool,
    #[serde(with = "crate::codec::decimal")]
    pub paid_token_count: u64,
}

/// Read side of the payment contract
///
/// Credit reconciliation depends on this seam rather than the concrete
/// contract so primary and fallback endpoints are interchangeable.
#[async_trait]
pub trait PaymentReads: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn mint_price(&self) -> Result<U256, ChainError>;

    async fn credit_record(&self, user: &Address, block: BlockTag) -> Result<CreditRecord, ChainError>;
}

/// Payment contract: price, credits, credit consumption
pub struct PaymentContract {
    rpc: Arc<EvmRpcClient>,
    address: Address,
    sender: Option<Arc<TransactionSender>>,
}

impl PaymentContract {
    /// Read-only handle
    pub fn new(rpc: Arc<EvmRpcClient>, address: Address) -> Self {
        Self {
            rpc,
            address,
            sender: None,
        }
    }

    /// Handle that can also submit `useMintingCredit`
    pub fn with_sender(mut self, sender: Arc<TransactionSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Consume one paid credit of `user` from the agent wallet
    pub async fn use_minting_credit(&self, user: &Address) -> Result<TransactionReceipt, ChainError> {
        let sender = self.sender.as_ref().ok_or(ChainError::ReadOnly)?;
        let data = abi::encode_call("useMintingCredit(address)", &[Token::Address(*user)]);
        let receipt = sender.send_call(self.address, data).await?;
        info!(hash = %receipt.transaction_hash, "Minting credit consumed");
        Ok(receipt)
    }

    async fn read(&self, data: Vec<u8>, block: BlockTag) -> Result<Vec<u8>, ChainError> {
        let out = self.rpc.call_contract(&self.address, &data, block).await?;
        if out.is_empty() {
            return Err(ChainError::Decode(
                "empty eth_call result (contract missing at this block?)".to_string(),
            ));
        }
        Ok(out)
    }
}

#[async_trait]
impl PaymentReads for PaymentContract {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.rpc.block_number().await
    }

    async fn mint_price(&self) -> Result<U256, ChainError> {
        let out = self
            .read(abi::encode_call("mintPrice()", &[]), BlockTag::Latest)
            .await?;
        abi::decode_uint(&out)
    }

    async fn credit_record(&self, user: &Address, block: BlockTag) -> Result<CreditRecord, ChainError> {
        let can_mint = self
            .read(
                abi::encode_call("userCanMint(address)", &[Token::Address(*user)]),
                block,
            )
            .await?;
        let count = self
            .read(
                abi::encode_call("getUserPaidTokenCount(address)", &[Token::Address(*user)]),
                block,
            )
            .await?;

        let paid_token_count = u64::try_from(abi::decode_uint(&count)?)
            .map_err(|_| ChainError::Decode("paid token count exceeds u64".to_string()))?;

        Ok(CreditRecord {
            can_mint: abi::decode_bool(&can_mint)?,
            paid_token_count,
        })
    }
}

/// Outcome of a successful `safeMint`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub token_id: Option<U256>,
}

/// ERC-721 collection the agent mints into
pub struct NftContract {
    rpc: Arc<EvmRpcClient>,
    address: Address,
    sender: Arc<TransactionSender>,
}

impl NftContract {
    pub fn new(rpc: Arc<EvmRpcClient>, address: Address, sender: Arc<TransactionSender>) -> Self {
        Self { rpc, address, sender }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `safeMint(to, uri)` and wait for the receipt
    pub async fn safe_mint(&self, to: &Address, token_uri: &str) -> Result<MintReceipt, ChainError> {
        let data = abi::encode_call(
            "safeMint(address,string)",
            &[Token::Address(*to), Token::String(token_uri.to_string())],
        );
        let receipt = self.sender.send_call(self.address, data).await?;

        Ok(MintReceipt {
            block_number: receipt.block_number()?,
            token_id: minted_token_id(&receipt, &self.address),
            transaction_hash: receipt.transaction_hash,
        })
    }

    /// `balanceOf(owner)` on this collection, or on `contract` when given
    pub async fn balance_of(&self, owner: &Address, contract: Option<Address>) -> Result<U256, ChainError> {
        let target = contract.unwrap_or(self.address);
        let data = abi::encode_call("balanceOf(address)", &[Token::Address(*owner)]);
        let out = self.rpc.call_contract(&target, &data, BlockTag::Latest).await?;
        abi::decode_uint(&out)
    }
}

/// Token id from the ERC-721 `Transfer` log emitted by `contract`, if present
fn minted_token_id(receipt: &TransactionReceipt, contract: &Address) -> Option<U256> {
    let transfer_topic = format!(
        "0x{}",
        hex::encode(keccak256("Transfer(address,address,uint256)".as_bytes()))
    );
    let contract = super::format_address(contract);

    receipt.logs.iter().find_map(|log| {
        let emitter = log.get("address")?.as_str()?.to_ascii_lowercase();
        if emitter != contract {
            return None;
        }
        let topics = log.get("topics")?.as_array()?;
        if topics.first()?.as_str()?.to_ascii_lowercase() != transfer_topic {
            return None;
        }
        parse_hex_u256(topics.get(3)?.as_str()?).ok()
    })
}
