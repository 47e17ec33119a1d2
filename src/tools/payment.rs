//! `check-payment` and `use-minting-credit`

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{address_arg, parse_args, ToolError, ToolHandler};
use crate::assistant::ToolDefinition;
use crate::chain::{format_address, BlockTag, ChainError, PaymentContract, PaymentReads};

pub const CHECK_PAYMENT_TOOL: &str = "check-payment";
pub const USE_MINTING_CREDIT_TOOL: &str = "use-minting-credit";

/// Revert reasons the payment contract raises, mapped to stable error tags
const REVERT_TAGS: &[(&str, &str, &str)] = &[
    (
        "User has no paid tokens available",
        "USER_NO_CREDITS",
        "User has no minting credits available. They need to pay first.",
    ),
    (
        "Only AI wallet can use minting credits",
        "UNAUTHORIZED",
        "Only the AI wallet can use minting credits",
    ),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserArgs {
    user_address: String,
}

fn user_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "userAddress": {
                "type": "string",
                "pattern": "^0x[a-fA-F0-9]{40}$",
                "description": description
            }
        },
        "required": ["userAddress"]
    })
}

pub struct CheckPaymentTool {
    payment: Arc<dyn PaymentReads>,
}

impl CheckPaymentTool {
    pub fn new(payment: Arc<dyn PaymentReads>) -> Self {
        Self { payment }
    }
}

#[async_trait]
impl ToolHandler for CheckPaymentTool {
    fn name(&self) -> &'static str {
        CHECK_PAYMENT_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            CHECK_PAYMENT_TOOL,
            "Check whether a user has paid minting credits available",
            user_schema("The wallet address of the user to check"),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: UserArgs = parse_args(args)?;
        let user = address_arg(&args.user_address, "userAddress")?;

        let record = self.payment.credit_record(&user, BlockTag::Latest).await?;
        let price = self.payment.mint_price().await?;

        let message = if record.can_mint {
            format!(
                "User has {} paid tokens available for minting",
                record.paid_token_count
            )
        } else {
            format!("User has no paid tokens available. They need to pay {} wei to mint", price)
        };

        Ok(json!({
            "success": true,
            "userAddress": format_address(&user),
            "canMint": record.can_mint,
            "paidTokenCount": record.paid_token_count.to_string(),
            "mintPrice": price.to_string(),
            "message": message,
        }))
    }
}

pub struct UseMintingCreditTool {
    payment: Arc<PaymentContract>,
}

impl UseMintingCreditTool {
    pub fn new(payment: Arc<PaymentContract>) -> Self {
        Self { payment }
    }
}

#[async_trait]
impl ToolHandler for UseMintingCreditTool {
    fn name(&self) -> &'static str {
        USE_MINTING_CREDIT_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            USE_MINTING_CREDIT_TOOL,
            "Consume one minting credit for a user. Call ONLY after the NFT has been minted to that user.",
            user_schema("The wallet address whose credit should be used"),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: UserArgs = parse_args(args)?;
        let user = address_arg(&args.user_address, "userAddress")?;

        match self.payment.use_minting_credit(&user).await {
            Ok(receipt) => Ok(json!({
                "success": true,
                "transactionHash": receipt.transaction_hash,
                "userAddress": format_address(&user),
                "message": format!(
                    "Used one minting credit for {}. Transaction: {}",
                    format_address(&user),
                    receipt.transaction_hash
                ),
            })),
            Err(e) => match classify_revert(&e) {
                Some(failure) => {
                    warn!(user = %format_address(&user), error = %e, "Minting credit rejected");
                    Ok(failure)
                }
                None => Err(e.into()),
            },
        }
    }
}

/// Structured failure for a known payment contract revert, if `error` is one
pub fn classify_revert(error: &ChainError) -> Option<Value> {
    let text = error.to_string();
    REVERT_TAGS
        .iter()
        .find(|(reason, _, _)| text.contains(reason))
        .map(|(_, tag, message)| {
            json!({
                "success": false,
                "error": tag,
                "message": message,
            })
        })
}
