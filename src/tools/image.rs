//! `generate-image`

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_args, ToolError, ToolHandler};
use crate::assistant::{BackendError, OpenAiClient, ToolDefinition};

pub const GENERATE_IMAGE_TOOL: &str = "generate-image";

/// Source of generated images
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Return a (temporary) URL of an image for `prompt`
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, BackendError>;
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, BackendError> {
        self.generate_image(prompt, model).await
    }
}

#[derive(Debug, Deserialize)]
struct GenerateImageArgs {
    prompt: String,
}

pub struct GenerateImageTool {
    generator: Arc<dyn ImageGenerator>,
    model: String,
}

impl GenerateImageTool {
    pub fn new(generator: Arc<dyn ImageGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for GenerateImageTool {
    fn name(&self) -> &'static str {
        GENERATE_IMAGE_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            GENERATE_IMAGE_TOOL,
            "Generate one square artwork from a prompt and return its URL",
            json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "The prompt to generate the image" }
                },
                "required": ["prompt"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: GenerateImageArgs = parse_args(args)?;
        if args.prompt.trim().is_empty() {
            return Err(ToolError::InvalidArguments("prompt is empty".to_string()));
        }

        let url = self.generator.generate(&args.prompt, &self.model).await?;
        info!(model = %self.model, "Image generated");
        Ok(json!({ "imageUrl": url }))
    }
}
