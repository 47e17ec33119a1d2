//! Conversational backend integration
//!
//! The agent runs on a pull-based Assistants-style API: an assistant holds
//! the instructions and tool definitions, a thread holds the conversation,
//! and a run is one execution of the assistant over a thread.
//!
//! ```text
//! create_assistant ─► create_thread ─► add_message(user task)
//!                                          │
//!                                     create_run
//!                                          │
//!              ┌──── latest_run ◄──────────┤ (poll)
//!              │                           │
//!              └─► submit_tool_outputs ────┘ (requires_action)
//! ```
//!
//! [`AssistantBackend`] is the seam the run driver depends on; the HTTP
//! implementation lives in [`client`].

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::OpenAiClient;
pub use types::{
    Assistant, AssistantSpec, ContentBlock, FunctionCall, FunctionDefinition, Role, Run,
    RunError, RunStatus, TextContent, Thread, ThreadMessage, ToolCall, ToolDefinition, ToolOutput,
};

/// Error type for backend operations
#[derive(Debug)]
pub enum BackendError {
    /// Network or connection failure
    Request(reqwest::Error),
    /// Backend answered with a non-success status
    Status { status: u16, body: String },
    /// Response body could not be decoded
    Parse(serde_json::Error),
    /// Response decoded but was missing something we need
    Invalid(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Request(e) => write!(f, "Request error: {}", e),
            BackendError::Status { status, body } => {
                write!(f, "Backend returned status {}: {}", status, body)
            }
            BackendError::Parse(e) => write!(f, "Parse error: {}", e),
            BackendError::Invalid(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Request(e)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Parse(e)
    }
}

/// Operations the orchestration core needs from the conversational backend
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<Assistant, BackendError>;

    async fn create_thread(&self) -> Result<Thread, BackendError>;

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ThreadMessage, BackendError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, BackendError>;

    /// Most recent run on the thread, or `None` if the backend lists none
    async fn latest_run(&self, thread_id: &str) -> Result<Option<Run>, BackendError>;

    /// Submit every output of a `requires_action` batch; returns the advanced run
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run, BackendError>;

    /// Messages on the thread, newest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError>;
}
