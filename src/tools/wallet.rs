//! Read-only wallet tools: `get-balance`, `get-nft-balance`, `get-wallet-address`

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{address_arg, parse_args, ToolError, ToolHandler};
use crate::assistant::ToolDefinition;
use crate::chain::{format_address, format_ether, Address, EvmRpcClient, NftContract};

pub const GET_BALANCE_TOOL: &str = "get-balance";
pub const GET_NFT_BALANCE_TOOL: &str = "get-nft-balance";
pub const GET_WALLET_ADDRESS_TOOL: &str = "get-wallet-address";

fn address_property(description: &str) -> Value {
    json!({
        "type": "string",
        "pattern": "^0x[a-fA-F0-9]{40}$",
        "description": description
    })
}

#[derive(Debug, Deserialize)]
struct BalanceArgs {
    wallet: String,
}

pub struct GetBalanceTool {
    rpc: Arc<EvmRpcClient>,
}

impl GetBalanceTool {
    pub fn new(rpc: Arc<EvmRpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolHandler for GetBalanceTool {
    fn name(&self) -> &'static str {
        GET_BALANCE_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            GET_BALANCE_TOOL,
            "Get the native balance of a wallet",
            json!({
                "type": "object",
                "properties": { "wallet": address_property("The wallet address to get the balance of") },
                "required": ["wallet"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: BalanceArgs = parse_args(args)?;
        let wallet = address_arg(&args.wallet, "wallet")?;
        let wei = self.rpc.get_balance(&wallet).await?;
        Ok(json!({
            "wallet": format_address(&wallet),
            "balanceWei": wei.to_string(),
            "balanceEth": format_ether(wei),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NftBalanceArgs {
    #[serde(default)]
    contract_address: Option<String>,
    wallet: String,
}

pub struct GetNftBalanceTool {
    nft: Arc<NftContract>,
}

impl GetNftBalanceTool {
    pub fn new(nft: Arc<NftContract>) -> Self {
        Self { nft }
    }
}

#[async_trait]
impl ToolHandler for GetNftBalanceTool {
    fn name(&self) -> &'static str {
        GET_NFT_BALANCE_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            GET_NFT_BALANCE_TOOL,
            "Get how many ERC-721 tokens a wallet holds (defaults to the collection this service mints into)",
            json!({
                "type": "object",
                "properties": {
                    "contractAddress": address_property("Optional ERC-721 contract address"),
                    "wallet": address_property("The wallet address to check")
                },
                "required": ["wallet"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: NftBalanceArgs = parse_args(args)?;
        let wallet = address_arg(&args.wallet, "wallet")?;
        let contract = args
            .contract_address
            .as_deref()
            .map(|raw| address_arg(raw, "contractAddress"))
            .transpose()?;

        let balance = self.nft.balance_of(&wallet, contract).await?;
        Ok(json!({
            "wallet": format_address(&wallet),
            "contractAddress": format_address(&contract.unwrap_or(self.nft.address())),
            "balance": balance.to_string(),
        }))
    }
}

pub struct GetWalletAddressTool {
    address: Address,
}

impl GetWalletAddressTool {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl ToolHandler for GetWalletAddressTool {
    fn name(&self) -> &'static str {
        GET_WALLET_ADDRESS_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            GET_WALLET_ADDRESS_TOOL,
            "Get the address of the wallet this service signs with",
            json!({ "type": "object", "properties": {}, "required": [] }),
        )
    }

    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!({ "address": format_address(&self.address) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::parse_address;

    #[tokio::test]
    async fn test_wallet_address_tool() {
        let address = parse_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        let tool = GetWalletAddressTool::new(address);
        let out = tool.call(json!({})).await.unwrap();
        assert_eq!(out["address"], "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert_eq!(tool.definition().function.name, GET_WALLET_ADDRESS_TOOL);
    }

    #[test]
    fn test_nft_balance_args_contract_optional() {
        let args: NftBalanceArgs = parse_args(json!({"wallet": "0x01"})).unwrap();
        assert!(args.contract_address.is_none());
    }
}
