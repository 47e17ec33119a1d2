//! Run driver - polls one agent run to a terminal state
//!
//! The backend is pull-based: the driver repeatedly reads the latest run,
//! executes tool batches when the run asks for them, and turns the terminal
//! state into a single content block.
//!
//! ```text
//!            ┌───────────────────────────────────────────┐
//!            ▼                                           │
//!   queued / in_progress / cancelling ── sleep ── latest_run
//!            │
//!   requires_action ── dispatch_batch ── submit_tool_outputs ─┐
//!            ▲                                                │
//!            └────────────────────────────────────────────────┘
//!
//!   completed  ─► newest assistant message (first block)
//!   failed     ─► "I encountered an error : <reason> " (appended to thread)
//!   cancelled / expired / incomplete ─► "No Response from assistant. ..."
//! ```
//!
//! Only transport failures are errors. A run that ends badly is still a
//! result the caller can inspect.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use super::dispatcher::{RunReport, ToolDispatcher};
use super::guard::MintState;
use super::sessions::Session;
use crate::assistant::{AssistantBackend, BackendError, ContentBlock, Role, Run, RunStatus};
use crate::metrics::{RUNS_TOTAL, RUN_POLLS};

/// Configuration for the run driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Delay between latest-run reads while the run is busy
    pub poll_interval: Duration,
    /// Upper bound on latest-run reads before giving up
    pub max_polls: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 600,
        }
    }
}

/// Outcome of driving a run to a terminal state
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Final answer (`{type: text, value}` for every synthesized message)
    pub content: ContentBlock,
    /// Terminal status the run ended in
    pub status: RunStatus,
    /// Structured tool results gathered along the way
    pub report: RunReport,
    /// Latest-run reads performed
    pub polls: u32,
    /// Tool output batches submitted
    pub batches: u32,
}

impl RunResult {
    /// Text of the final content block, empty for non-text blocks
    pub fn text(&self) -> &str {
        self.content.as_text().unwrap_or_default()
    }
}

/// Error type for run driving
///
/// Both variants carry the report gathered before the run was abandoned, so
/// a mint that already happened is not lost with the error.
#[derive(Debug)]
pub enum DriverError {
    /// Backend was unreachable or answered with garbage
    Transport { source: BackendError, report: RunReport },
    /// Run stayed non-terminal for `max_polls` reads
    Timeout {
        polls: u32,
        last_status: RunStatus,
        report: RunReport,
    },
}

impl DriverError {
    /// Tool results gathered before the run was abandoned
    pub fn report(&self) -> &RunReport {
        match self {
            DriverError::Transport { report, .. } | DriverError::Timeout { report, .. } => report,
        }
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Transport { source, .. } => write!(f, "Backend transport error: {}", source),
            DriverError::Timeout {
                polls, last_status, ..
            } => write!(f, "Run still {} after {} polls", last_status, polls),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Transport { source, .. } => Some(source),
            DriverError::Timeout { .. } => None,
        }
    }
}

fn transport(report: &RunReport) -> impl FnOnce(BackendError) -> DriverError + '_ {
    move |source| DriverError::Transport {
        source,
        report: report.clone(),
    }
}

/// Message used when a run ends without an assistant answer
pub fn no_response_message(status: RunStatus) -> String {
    format!("No Response from assistant. Final status: {}", status)
}

/// Message recorded when a run fails
pub fn failure_message(run: &Run) -> String {
    let reason = run
        .last_error
        .as_ref()
        .map(|error| error.message.trim())
        .filter(|message| !message.is_empty())
        .unwrap_or("unknown error");
    format!("I encountered an error : {} ", reason)
}

/// Drives runs to completion, executing tool calls along the way
pub struct RunDriver {
    backend: Arc<dyn AssistantBackend>,
    dispatcher: Arc<ToolDispatcher>,
    config: DriverConfig,
}

impl RunDriver {
    /// Create a new run driver
    ///
    /// # Arguments
    /// * `backend` - Conversational backend the run lives on
    /// * `dispatcher` - Tool registry used for `requires_action` batches
    /// * `config` - Polling configuration
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        dispatcher: Arc<ToolDispatcher>,
        config: DriverConfig,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            config,
        }
    }

    /// Drive `run` on `session` until it is terminal
    ///
    /// A fresh [`MintState`] is created here, so the mint guard is scoped to
    /// exactly this run.
    pub async fn perform_run(&self, session: &Session, run: Run) -> Result<RunResult, DriverError> {
        let span = info_span!(
            "agent_run",
            session_id = %session.id,
            run_id = %run.id,
            otel.name = "agent_run"
        );

        async {
            let mut state = MintState::new();
            let mut report = RunReport::default();
            let mut run = run;
            let mut polls: u32 = 0;
            let mut batches: u32 = 0;

            info!(status = %run.status, "Driving run");

            while !run.status.is_terminal() {
                if run.status == RunStatus::RequiresAction {
                    let calls = run.pending_tool_calls().to_vec();
                    let batch = self.dispatcher.dispatch_batch(&calls, &mut state).await;
                    report.absorb(&batch.records);

                    if !batch.outputs.is_empty() {
                        batches += 1;
                        debug!(batch = batches, outputs = batch.outputs.len(), "Submitting tool outputs");
                        run = self
                            .backend
                            .submit_tool_outputs(&session.id, &run.id, batch.outputs)
                            .await
                            .map_err(transport(&report))?;
                        continue;
                    }
                    warn!(calls = calls.len(), "No tool outputs to submit, polling instead");
                }

                if polls >= self.config.max_polls {
                    RUN_POLLS.observe(f64::from(polls));
                    RUNS_TOTAL.with_label_values(&["timeout"]).inc();
                    return Err(DriverError::Timeout {
                        polls,
                        last_status: run.status,
                        report,
                    });
                }

                tokio::time::sleep(self.config.poll_interval).await;
                polls += 1;

                match self
                    .backend
                    .latest_run(&session.id)
                    .await
                    .map_err(transport(&report))?
                {
                    Some(latest) => {
                        if latest.status != run.status {
                            debug!(from = %run.status, to = %latest.status, "Run status changed");
                        }
                        run = latest;
                    }
                    None => debug!("Backend listed no runs, keeping previous state"),
                }
            }

            RUN_POLLS.observe(f64::from(polls));
            RUNS_TOTAL.with_label_values(&[run.status.as_str()]).inc();

            let content = self
                .finish(session, &run)
                .await
                .map_err(transport(&report))?;
            info!(
                status = %run.status,
                polls,
                batches,
                executed = report.executed,
                blocked = report.blocked,
                "Run finished"
            );

            Ok(RunResult {
                content,
                status: run.status,
                report,
                polls,
                batches,
            })
        }
        .instrument(span)
        .await
    }

    async fn finish(&self, session: &Session, run: &Run) -> Result<ContentBlock, BackendError> {
        match run.status {
            RunStatus::Failed => {
                let message = failure_message(run);
                warn!(reason = %message.trim(), "Run failed");
                // The audit trail is best effort: the caller still gets the message
                if let Err(e) = self
                    .backend
                    .add_message(&session.id, Role::Assistant, &message)
                    .await
                {
                    warn!(error = %e, "Failed to append failure message to session");
                }
                Ok(ContentBlock::text(message))
            }
            RunStatus::Completed => {
                let messages = self.backend.list_messages(&session.id).await?;
                // Only the newest assistant message counts, even when it is empty
                let answer = messages
                    .into_iter()
                    .find(|message| message.role == Role::Assistant)
                    .and_then(|message| message.content.into_iter().next());
                Ok(answer.unwrap_or_else(|| ContentBlock::text(no_response_message(run.status))))
            }
            status => Ok(ContentBlock::text(no_response_message(status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::RunError;

    fn run_with(status: RunStatus, error: Option<&str>) -> Run {
        Run {
            id: "run_1".into(),
            thread_id: "thread_1".into(),
            status,
            required_action: None,
            last_error: error.map(|message| RunError {
                code: "server_error".into(),
                message: message.into(),
            }),
        }
    }

    #[test]
    fn test_failure_message_with_reason() {
        let run = run_with(RunStatus::Failed, Some("rate limited"));
        assert_eq!(failure_message(&run), "I encountered an error : rate limited ");
    }

    #[test]
    fn test_failure_message_without_reason() {
        assert_eq!(
            failure_message(&run_with(RunStatus::Failed, None)),
            "I encountered an error : unknown error "
        );
        assert_eq!(
            failure_message(&run_with(RunStatus::Failed, Some("  "))),
            "I encountered an error : unknown error "
        );
    }

    #[test]
    fn test_no_response_message() {
        assert_eq!(
            no_response_message(RunStatus::Expired),
            "No Response from assistant. Final status: expired"
        );
    }

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_polls, 600);
    }
}
