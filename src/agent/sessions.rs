//! Agent sessions: one conversation thread per mint request
//!
//! The manager provisions the assistant once (lazily, on first use) and then
//! opens a fresh thread for every request. Threads are abandoned once their
//! run is terminal; nothing is persisted locally.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::assistant::{AssistantBackend, AssistantSpec, BackendError, Role, Run};

/// Error type for session operations
#[derive(Debug)]
pub enum SessionError {
    /// Backend could not allocate the session or rejected the task message
    Creation(BackendError),
    /// Backend returned a session without an id
    InvalidSession,
    /// Assistant id is empty
    InvalidAssistant,
    /// Backend refused to start the run
    RunStart(BackendError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Creation(e) => write!(f, "Failed to create session: {}", e),
            SessionError::InvalidSession => write!(f, "Session id is empty"),
            SessionError::InvalidAssistant => write!(f, "Assistant id is empty"),
            SessionError::RunStart(e) => write!(f, "Failed to start run: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// An open conversation with the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Backend thread id (never empty)
    pub id: String,
    /// The task message the session was opened with
    pub task: String,
}

/// Opens sessions and starts runs against one provisioned assistant
pub struct SessionManager {
    backend: Arc<dyn AssistantBackend>,
    spec: AssistantSpec,
    assistant_id: OnceCell<String>,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    /// * `backend` - Conversational backend
    /// * `spec` - Model, instructions and tool definitions for the assistant
    pub fn new(backend: Arc<dyn AssistantBackend>, spec: AssistantSpec) -> Self {
        Self {
            backend,
            spec,
            assistant_id: OnceCell::new(),
        }
    }

    /// Reuse an assistant that already exists on the backend
    pub fn with_assistant_id(backend: Arc<dyn AssistantBackend>, spec: AssistantSpec, id: String) -> Self {
        Self {
            backend,
            spec,
            assistant_id: OnceCell::new_with(Some(id)),
        }
    }

    /// Id of the provisioned assistant, creating it on first call
    pub async fn assistant_id(&self) -> Result<String, SessionError> {
        let id = self
            .assistant_id
            .get_or_try_init(|| async {
                let assistant = self
                    .backend
                    .create_assistant(&self.spec)
                    .await
                    .map_err(SessionError::Creation)?;
                if assistant.id.is_empty() {
                    return Err(SessionError::InvalidAssistant);
                }
                info!(assistant_id = %assistant.id, model = %self.spec.model, "Assistant provisioned");
                println!("[AGENT] Assistant provisioned: {}", assistant.id);
                Ok::<_, SessionError>(assistant.id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Open a new session seeded with `task` as the user message
    pub async fn open(&self, task: &str) -> Result<Session, SessionError> {
        let thread = self
            .backend
            .create_thread()
            .await
            .map_err(SessionError::Creation)?;
        if thread.id.is_empty() {
            return Err(SessionError::InvalidSession);
        }

        self.backend
            .add_message(&thread.id, Role::User, task)
            .await
            .map_err(SessionError::Creation)?;

        debug!(session_id = %thread.id, "Session opened");
        Ok(Session {
            id: thread.id,
            task: task.to_string(),
        })
    }

    /// Start the single run of `session`
    pub async fn start_run(&self, session: &Session, assistant_id: &str) -> Result<Run, SessionError> {
        if session.id.is_empty() {
            return Err(SessionError::InvalidSession);
        }
        if assistant_id.is_empty() {
            return Err(SessionError::InvalidAssistant);
        }

        let run = self
            .backend
            .create_run(&session.id, assistant_id)
            .await
            .map_err(SessionError::RunStart)?;
        debug!(session_id = %session.id, run_id = %run.id, status = %run.status, "Run started");
        Ok(run)
    }
}

