//! IPFS pinning client (Pinata)
//!
//! The mint tool pins the generated image first, then the ERC-721 metadata
//! document that points at it. Both are pinned as CIDv1.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Default Pinata API base URL
pub const DEFAULT_PINNING_BASE_URL: &str = "https://api.pinata.cloud";

/// Public gateway used to build browsable URLs
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs";

/// Error type for pinning operations
#[derive(Debug)]
pub enum PinningError {
    /// Network or connection failure
    Request(reqwest::Error),
    /// Service answered with a non-success status
    Status { status: u16, body: String },
    /// Source image could not be fetched
    Download(String),
}

impl std::fmt::Display for PinningError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinningError::Request(e) => write!(f, "Pinning request error: {}", e),
            PinningError::Status { status, body } => {
                write!(f, "Pinning service returned status {}: {}", status, body)
            }
            PinningError::Download(msg) => write!(f, "Image download failed: {}", msg),
        }
    }
}

impl std::error::Error for PinningError {}

impl From<reqwest::Error> for PinningError {
    fn from(e: reqwest::Error) -> Self {
        PinningError::Request(e)
    }
}

/// Credentials accepted by the pinning service
#[derive(Debug, Clone)]
pub enum PinningAuth {
    Jwt(String),
    ApiKey { key: String, secret: String },
}

/// A pinned object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedObject {
    pub cid: String,
    pub size: u64,
}

impl PinnedObject {
    pub fn ipfs_uri(&self) -> String {
        format!("ipfs://{}", self.cid)
    }
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pin_size: u64,
}

/// Pinning service client
#[derive(Clone)]
pub struct PinningClient {
    base_url: String,
    gateway_url: String,
    auth: PinningAuth,
    client: reqwest::Client,
}

impl PinningClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Pinning API base URL
    /// * `gateway_url` - Gateway prefix for browsable links
    /// * `auth` - JWT or key/secret pair
    /// * `timeout` - Per-request transport timeout
    pub fn new(
        base_url: impl Into<String>,
        gateway_url: impl Into<String>,
        auth: PinningAuth,
        timeout: Duration,
    ) -> Result<Self, PinningError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    /// Browsable gateway URL for a CID
    pub fn gateway_url(&self, cid: &str) -> String {
        format!("{}/{}", self.gateway_url, cid)
    }

    /// Fetch a remote image into memory, returning bytes and content type
    pub async fn download(&self, url: &str) -> Result<(Vec<u8>, String), PinningError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PinningError::Download(format!("{} returned {}", url, status)));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(PinningError::Download(format!("{} returned an empty body", url)));
        }
        debug!(url = %url, bytes = bytes.len(), "Downloaded image");
        Ok((bytes.to_vec(), content_type))
    }

    /// Pin raw file bytes
    pub async fn pin_file(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<PinnedObject, PinningError> {
        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("pinataMetadata", json!({ "name": name }).to_string())
            .text("pinataOptions", json!({ "cidVersion": 1 }).to_string());

        let request = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.base_url))
            .multipart(form);
        let pinned = self.send(request).await?;
        info!(cid = %pinned.cid, size = pinned.size, "Pinned file");
        Ok(pinned)
    }

    /// Pin a JSON document
    pub async fn pin_json(&self, name: &str, content: &Value) -> Result<PinnedObject, PinningError> {
        let body = json!({
            "pinataContent": content,
            "pinataMetadata": { "name": name },
            "pinataOptions": { "cidVersion": 1 },
        });
        let request = self
            .client
            .post(format!("{}/pinning/pinJSONToIPFS", self.base_url))
            .json(&body);
        let pinned = self.send(request).await?;
        info!(cid = %pinned.cid, "Pinned JSON");
        Ok(pinned)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<PinnedObject, PinningError> {
        let request = match &self.auth {
            PinningAuth::Jwt(token) => request.bearer_auth(token),
            PinningAuth::ApiKey { key, secret } => request
                .header("pinata_api_key", key)
                .header("pinata_secret_api_key", secret),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PinningError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let pinned: PinResponse = response.json().await?;
        Ok(PinnedObject {
            cid: pinned.ipfs_hash,
            size: pinned.pin_size,
        })
    }
}
