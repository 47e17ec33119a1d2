//! EIP-1559 transaction building, signing and submission

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_rlp::{length_of_length, BufMut, Encodable, Header};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::rpc::{EvmRpcClient, TransactionReceipt};
use super::signer::{RecoverableSignature, TransactionSigner};
use super::ChainError;

/// Priority tip added on top of the node's gas price
const PRIORITY_FEE_WEI: u64 = 1_000_000_000;

/// Gas limit used when estimation fails for a non-revert reason
const FALLBACK_GAS_LIMIT: u64 = 500_000;

const EMPTY_ACCESS_LIST_RLP_LEN: usize = 1;

#[derive(Clone, Debug)]
pub struct Eip1559Tx {
    pub chain_id: U256,
    pub nonce: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Eip1559Tx {
    fn fields_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
            + EMPTY_ACCESS_LIST_RLP_LEN
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(out);
    }

    /// Hash that gets signed: keccak256(0x02 || rlp(fields))
    pub fn signing_hash(&self) -> alloy_primitives::B256 {
        keccak256(typed_envelope(alloy_rlp::encode(self)))
    }

    /// Raw bytes for `eth_sendRawTransaction`
    pub fn encode_signed(&self, signature: &RecoverableSignature) -> Vec<u8> {
        typed_envelope(alloy_rlp::encode(SignedEip1559Tx {
            tx: self,
            signature,
        }))
    }
}

impl Encodable for Eip1559Tx {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.fields_length(),
        }
        .encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_length();
        payload_length + length_of_length(payload_length)
    }
}

struct SignedEip1559Tx<'a> {
    tx: &'a Eip1559Tx,
    signature: &'a RecoverableSignature,
}

impl SignedEip1559Tx<'_> {
    fn payload_length(&self) -> usize {
        self.tx.fields_length()
            + self.signature.y_parity.length()
            + self.signature.r.length()
            + self.signature.s.length()
    }
}

impl Encodable for SignedEip1559Tx<'_> {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.tx.encode_fields(out);
        self.signature.y_parity.encode(out);
        self.signature.r.encode(out);
        self.signature.s.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + length_of_length(payload_length)
    }
}

fn typed_envelope(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0x02);
    out.extend_from_slice(&payload);
    out
}

/// Signs and submits contract calls from the agent wallet
///
/// Nonce lookup, signing and broadcast are serialized so concurrent mints
/// from the same wallet never reuse a nonce.
pub struct TransactionSender {
    rpc: Arc<EvmRpcClient>,
    signer: Arc<dyn TransactionSigner>,
    chain_id: u64,
    nonce_lock: Mutex<()>,
    receipt_interval: Duration,
    receipt_attempts: u32,
}

impl TransactionSender {
    pub fn new(rpc: Arc<EvmRpcClient>, signer: Arc<dyn TransactionSigner>, chain_id: u64) -> Self {
        Self {
            rpc,
            signer,
            chain_id,
            nonce_lock: Mutex::new(()),
            receipt_interval: Duration::from_secs(2),
            receipt_attempts: 60,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn rpc(&self) -> &EvmRpcClient {
        &self.rpc
    }

    /// Send a contract call and wait for a successful receipt
    pub async fn send_call(&self, to: Address, data: Vec<u8>) -> Result<TransactionReceipt, ChainError> {
        let from = self.signer.address();
        let gas_limit = self.gas_limit(&from, &to, &data).await?;
        let gas_price = self.rpc.gas_price().await?;
        let priority = U256::from(PRIORITY_FEE_WEI);

        let hash = {
            let _guard = self.nonce_lock.lock().await;
            let nonce = self.rpc.transaction_count(&from).await?;

            let tx = Eip1559Tx {
                chain_id: U256::from(self.chain_id),
                nonce: U256::from(nonce),
                max_priority_fee_per_gas: priority,
                max_fee_per_gas: gas_price + priority,
                gas_limit,
                to,
                value: U256::ZERO,
                data: Bytes::from(data),
            };
            let signature = self.signer.sign_hash(&tx.signing_hash())?;
            let raw = tx.encode_signed(&signature);

            debug!(nonce, gas_limit = %gas_limit, "Broadcasting transaction");
            self.rpc.send_raw_transaction(&raw).await?
        };

        info!(hash = %hash, "Transaction submitted");
        self.rpc
            .wait_for_receipt(&hash, self.receipt_interval, self.receipt_attempts)
            .await
    }

    async fn gas_limit(&self, from: &Address, to: &Address, data: &[u8]) -> Result<U256, ChainError> {
        match self.rpc.estimate_gas(from, to, data).await {
            // 20% headroom over the estimate
            Ok(estimate) => Ok(estimate * U256::from(12u8) / U256::from(10u8)),
            Err(ChainError::Rpc { message, method }) if is_revert(&message) => {
                Err(ChainError::Rpc { method, message })
            }
            Err(e) => {
                warn!(error = %e, "Gas estimation failed, using fallback limit");
                Ok(U256::from(FALLBACK_GAS_LIMIT))
            }
        }
    }
}

fn is_revert(message: &str) -> bool {
    message.to_ascii_lowercase().contains("revert")
}
