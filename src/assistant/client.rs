//! HTTP client for the OpenAI Assistants (v2) and Images APIs

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::types::{Assistant, AssistantSpec, Role, Run, Thread, ThreadMessage, ToolOutput};
use super::{AssistantBackend, BackendError};

/// Default API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Beta header required by the Assistants API
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Paged list envelope used by the list endpoints
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// Client for the Assistants and Images endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.openai.com")
    /// * `api_key` - Bearer token
    /// * `timeout` - Per-request timeout enforced by the transport
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Generate one 1024x1024 image and return its temporary URL
    pub async fn generate_image(&self, prompt: &str, model: &str) -> Result<String, BackendError> {
        let endpoint = format!("{}/v1/images/generations", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "size": "1024x1024",
            "quality": "standard",
            "n": 1
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let images: ImageResponse = decode(response).await?;

        images
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .ok_or_else(|| BackendError::Invalid("image response contained no URL".to_string()))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, BackendError> {
        let endpoint = format!("{}{}", self.base_url, path);
        debug!(endpoint = %endpoint, "POST");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let endpoint = format!("{}{}", self.base_url, path);
        debug!(endpoint = %endpoint, "GET");
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
            .send()
            .await?;
        decode(response).await
    }
}

/// Check status, then parse the body
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    if text.is_empty() {
        return Err(BackendError::Invalid("empty response body".to_string()));
    }

    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl AssistantBackend for OpenAiClient {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant, BackendError> {
        self.post_json("/v1/assistants", serde_json::to_value(spec)?)
            .await
    }

    async fn create_thread(&self) -> Result<Thread, BackendError> {
        self.post_json("/v1/threads", serde_json::json!({})).await
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ThreadMessage, BackendError> {
        self.post_json(
            &format!("/v1/threads/{}/messages", thread_id),
            serde_json::json!({ "role": role, "content": content }),
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, BackendError> {
        self.post_json(
            &format!("/v1/threads/{}/runs", thread_id),
            serde_json::json!({ "assistant_id": assistant_id }),
        )
        .await
    }

    async fn latest_run(&self, thread_id: &str) -> Result<Option<Run>, BackendError> {
        // No direct refresh primitive: list newest-first with limit 1
        let runs: ListResponse<Run> = self
            .get_json(&format!("/v1/threads/{}/runs?limit=1&order=desc", thread_id))
            .await?;
        Ok(runs.data.into_iter().next())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run, BackendError> {
        self.post_json(
            &format!("/v1/threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id),
            serde_json::json!({ "tool_outputs": outputs }),
        )
        .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let messages: ListResponse<ThreadMessage> = self
            .get_json(&format!("/v1/threads/{}/messages?order=desc", thread_id))
            .await?;
        Ok(messages.data)
    }
}
