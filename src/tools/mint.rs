//! `mint-and-upload`: pin the image, pin ERC-721 metadata, mint
//!
//! ```text
//! imageUrl ─► download ─► pin_file ─► metadata{image: ipfs://<imageCid>}
//!                                          │
//!                                      pin_json
//!                                          │
//!                     safeMint(to, ipfs://<metadataCid>) ─► receipt
//! ```
//!
//! This is the one irreversible tool. The dispatcher's mint guard makes sure
//! it runs at most once per run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

use super::{address_arg, parse_args, ToolError, ToolHandler};
use crate::assistant::ToolDefinition;
use crate::chain::{format_address, NftContract, U256};
use crate::ipfs::PinningClient;

pub const MINT_AND_UPLOAD_TOOL: &str = "mint-and-upload";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintAndUploadArgs {
    #[serde(alias = "filePath")]
    image_url: String,
    name: String,
    description: String,
    to: String,
    #[serde(default)]
    attributes: Vec<Value>,
    #[serde(default, alias = "external_url")]
    external_url: Option<String>,
}

/// Structured result of a successful mint
///
/// The run driver keeps this in its report so the mint outcome never has to
/// be scraped from the agent's prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintAndUploadResult {
    pub success: bool,
    pub image_ipfs_hash: String,
    pub image_gateway_url: String,
    pub metadata_ipfs_hash: String,
    pub metadata_ipfs_url: String,
    pub metadata_gateway_url: String,
    pub transaction_hash: String,
    #[serde(with = "crate::codec::decimal")]
    pub block_number: u64,
    #[serde(default, with = "crate::codec::decimal_opt", skip_serializing_if = "Option::is_none")]
    pub token_id: Option<U256>,
    pub recipient: String,
    pub contract_address: String,
    pub original_image_url: String,
    pub nft_minting_complete: bool,
}

pub struct MintAndUploadTool {
    pinning: PinningClient,
    nft: Arc<NftContract>,
}

impl MintAndUploadTool {
    pub fn new(pinning: PinningClient, nft: Arc<NftContract>) -> Self {
        Self { pinning, nft }
    }
}

#[async_trait]
impl ToolHandler for MintAndUploadTool {
    fn name(&self) -> &'static str {
        MINT_AND_UPLOAD_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            MINT_AND_UPLOAD_TOOL,
            "Upload the generated image and its metadata to IPFS and mint EXACTLY ONE NFT. Call this only ONCE per request.",
            json!({
                "type": "object",
                "properties": {
                    "imageUrl": { "type": "string", "description": "Direct URL of the generated image" },
                    "name": { "type": "string", "description": "Name of the NFT" },
                    "description": { "type": "string", "description": "Description of the NFT" },
                    "to": {
                        "type": "string",
                        "pattern": "^0x[a-fA-F0-9]{40}$",
                        "description": "Wallet address that receives the NFT"
                    },
                    "attributes": {
                        "type": "array",
                        "description": "Optional trait attributes",
                        "items": {
                            "type": "object",
                            "properties": {
                                "trait_type": { "type": "string" },
                                "value": { "type": ["string", "number"] }
                            }
                        }
                    },
                    "externalUrl": { "type": "string", "description": "Optional external link" }
                },
                "required": ["imageUrl", "name", "description", "to"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: MintAndUploadArgs = parse_args(args)?;
        let recipient = address_arg(&args.to, "to")?;
        if !(args.image_url.starts_with("http://") || args.image_url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!(
                "imageUrl must be an http(s) URL: {}",
                args.image_url
            )));
        }

        let span = info_span!("mint_and_upload", recipient = %format_address(&recipient));
        async {
            let (bytes, content_type) = self.pinning.download(&args.image_url).await?;
            let file_name = format!("{}.{}", slug(&args.name), extension_for(&content_type));
            let image = self.pinning.pin_file(&file_name, bytes, &content_type).await?;

            let metadata = build_metadata(
                &args.name,
                &args.description,
                &image.ipfs_uri(),
                &args.attributes,
                args.external_url.as_deref(),
            );
            let metadata_pin = self
                .pinning
                .pin_json(&format!("{}-metadata", args.name), &metadata)
                .await?;

            println!("[MINT] safeMint to {} ({})", format_address(&recipient), metadata_pin.ipfs_uri());
            let receipt = self.nft.safe_mint(&recipient, &metadata_pin.ipfs_uri()).await?;
            info!(
                hash = %receipt.transaction_hash,
                block = receipt.block_number,
                "NFT minted"
            );

            let result = MintAndUploadResult {
                success: true,
                image_gateway_url: self.pinning.gateway_url(&image.cid),
                image_ipfs_hash: image.cid,
                metadata_gateway_url: self.pinning.gateway_url(&metadata_pin.cid),
                metadata_ipfs_url: metadata_pin.ipfs_uri(),
                metadata_ipfs_hash: metadata_pin.cid,
                transaction_hash: receipt.transaction_hash,
                block_number: receipt.block_number,
                token_id: receipt.token_id,
                recipient: format_address(&recipient),
                contract_address: format_address(&self.nft.address()),
                original_image_url: args.image_url.clone(),
                nft_minting_complete: true,
            };

            serde_json::to_value(&result)
                .map_err(|e| ToolError::Failed(format!("unserializable result: {}", e)))
        }
        .instrument(span)
        .await
    }
}

/// ERC-721 metadata document
pub fn build_metadata(
    name: &str,
    description: &str,
    image_uri: &str,
    attributes: &[Value],
    external_url: Option<&str>,
) -> Value {
    let mut metadata = json!({
        "name": name,
        "description": description,
        "image": image_uri,
        "attributes": attributes,
    });
    if let (Some(url), Some(map)) = (external_url, metadata.as_object_mut()) {
        map.insert("external_url".to_string(), Value::String(url.to_string()));
    }
    metadata
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "nft".to_string()
    } else {
        slug.to_string()
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().map(str::trim) {
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_shape() {
        let metadata = build_metadata(
            "Neon Cube",
            "A cube",
            "ipfs://bafyimage",
            &[json!({"trait_type": "Rarity", "value": "rare"})],
            Some("https://example.test"),
        );
        assert_eq!(metadata["image"], "ipfs://bafyimage");
        assert_eq!(metadata["attributes"][0]["value"], "rare");
        assert_eq!(metadata["external_url"], "https://example.test");

        let bare = build_metadata("n", "d", "ipfs://x", &[], None);
        assert!(bare.get("external_url").is_none());
    }

    #[test]
    fn test_result_block_number_is_decimal_string() {
        let result = MintAndUploadResult {
            success: true,
            image_ipfs_hash: "img".into(),
            image_gateway_url: "https://gw/img".into(),
            metadata_ipfs_hash: "meta".into(),
            metadata_ipfs_url: "ipfs://meta".into(),
            metadata_gateway_url: "https://gw/meta".into(),
            transaction_hash: format!("0x{}", "ab".repeat(32)),
            block_number: 12_345_678,
            token_id: None,
            recipient: "0x01".into(),
            contract_address: "0x02".into(),
            original_image_url: "https://img".into(),
            nft_minting_complete: true,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["blockNumber"], "12345678");
        assert!(value.get("tokenId").is_none());

        let back: MintAndUploadResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_args_accept_legacy_field_names() {
        let args: MintAndUploadArgs = parse_args(json!({
            "filePath": "https://img",
            "name": "n",
            "description": "d",
            "to": "0x01",
            "external_url": "https://x"
        }))
        .unwrap();
        assert_eq!(args.image_url, "https://img");
        assert_eq!(args.external_url.as_deref(), Some("https://x"));
        assert!(args.attributes.is_empty());
    }

    #[test]
    fn test_slug_and_extension() {
        assert_eq!(slug("Neon Cube #1"), "neon-cube--1");
        assert_eq!(slug("***"), "nft");
        assert_eq!(extension_for("image/jpeg; charset=binary"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }
}
