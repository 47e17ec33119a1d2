//! Tool dispatcher: routes a batch of agent tool calls to their handlers
//!
//! ```text
//! requires_action.tool_calls
//!          │
//!          ▼
//!   admission (sequential, in call order)
//!     unknown name ──────────► skipped (no output)
//!     mint + latch set ──────► block payload
//!     otherwise ─────────────► admitted (mint admission sets the latch)
//!          │
//!          ▼
//!   execution (admitted calls concurrently, barrier join)
//!     Ok(json)  ─► output = json, wide integers as strings
//!     Err(e)    ─► output = "Error: <e>"
//! ```
//!
//! Admission runs before any handler starts, so two mint calls in the same
//! batch cannot both reach the handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use super::guard::{block_payload, is_mint_action, should_block, MintState};
use crate::assistant::{ToolCall, ToolDefinition, ToolOutput};
use crate::codec::stringify_wide_integers;
use crate::metrics::{MINT_GUARD_BLOCKS, TOOL_CALLS_TOTAL, TOOL_CALL_DURATION};
use crate::tools::image::GENERATE_IMAGE_TOOL;
use crate::tools::mint::MintAndUploadResult;
use crate::tools::ToolHandler;

/// What happened to one tool call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Handler ran and returned this JSON
    Executed(Value),
    /// Handler (or argument parsing) failed with this message
    Failed(String),
    /// Mint guard refused the call
    Blocked,
    /// No handler is registered under this name
    Skipped,
}

impl CallOutcome {
    fn label(&self) -> &'static str {
        match self {
            CallOutcome::Executed(_) => "executed",
            CallOutcome::Failed(_) => "failed",
            CallOutcome::Blocked => "blocked",
            CallOutcome::Skipped => "skipped",
        }
    }

    /// Output string sent back to the run, `None` for skipped calls
    fn output(&self) -> Option<String> {
        match self {
            CallOutcome::Executed(value) => Some(value.to_string()),
            CallOutcome::Failed(message) => Some(format!("Error: {}", message)),
            CallOutcome::Blocked => Some(block_payload().to_string()),
            CallOutcome::Skipped => None,
        }
    }
}

/// Record of a single dispatched call
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: CallOutcome,
}

/// Outputs to submit plus a record per call, both in call order
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub outputs: Vec<ToolOutput>,
    pub records: Vec<DispatchRecord>,
}

/// Structured facts collected across every batch of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Last image URL returned by `generate-image`
    pub image_url: Option<String>,
    /// Result of the admitted mint call, if it succeeded
    pub mint_result: Option<MintAndUploadResult>,
    /// Error of the admitted mint call, if it failed
    pub mint_error: Option<String>,
    pub executed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
}

impl RunReport {
    /// Whether a mint call reached the handler during this run
    pub fn mint_attempted(&self) -> bool {
        self.mint_result.is_some() || self.mint_error.is_some()
    }

    pub fn absorb(&mut self, records: &[DispatchRecord]) {
        for record in records {
            match &record.outcome {
                CallOutcome::Executed(value) => {
                    self.executed += 1;
                    if record.tool_name == GENERATE_IMAGE_TOOL {
                        if let Some(url) = value.get("imageUrl").and_then(Value::as_str) {
                            self.image_url = Some(url.to_string());
                        }
                    } else if is_mint_action(&record.tool_name) {
                        match serde_json::from_value::<MintAndUploadResult>(value.clone()) {
                            Ok(result) => self.mint_result = Some(result),
                            Err(e) => self.mint_error = Some(format!("unexpected mint result: {}", e)),
                        }
                    }
                }
                CallOutcome::Failed(message) => {
                    self.failed += 1;
                    if is_mint_action(&record.tool_name) {
                        self.mint_error = Some(message.clone());
                    }
                }
                CallOutcome::Blocked => self.blocked += 1,
                CallOutcome::Skipped => self.skipped += 1,
            }
        }
    }
}

enum Admission {
    Run(Arc<dyn ToolHandler>),
    Block,
    Skip,
}

/// Registry of tool handlers keyed by wire name
#[derive(Default, Clone)]
pub struct ToolDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.handlers.values().map(|handler| handler.definition()).collect();
        definitions.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Dispatch a single call
    pub async fn dispatch(&self, call: &ToolCall, state: &mut MintState) -> Option<ToolOutput> {
        self.dispatch_batch(std::slice::from_ref(call), state)
            .await
            .outputs
            .into_iter()
            .next()
    }

    /// Dispatch every call of one `requires_action` batch
    ///
    /// # Arguments
    /// * `calls` - Pending tool calls in backend order
    /// * `state` - Mint guard state of the run; latched here when a mint is admitted
    pub async fn dispatch_batch(&self, calls: &[ToolCall], state: &mut MintState) -> BatchOutcome {
        let admissions: Vec<Admission> = calls
            .iter()
            .map(|call| self.admit(call, state))
            .collect();

        let executions = calls
            .iter()
            .zip(admissions)
            .map(|(call, admission)| async move {
                match admission {
                    Admission::Run(handler) => execute(handler, call).await,
                    Admission::Block => CallOutcome::Blocked,
                    Admission::Skip => CallOutcome::Skipped,
                }
            });
        let outcomes = join_all(executions).await;

        let mut batch = BatchOutcome::default();
        for (call, outcome) in calls.iter().zip(outcomes) {
            let tool_label = if matches!(outcome, CallOutcome::Skipped) {
                "unknown"
            } else {
                call.function.name.as_str()
            };
            TOOL_CALLS_TOTAL
                .with_label_values(&[tool_label, outcome.label()])
                .inc();

            if let Some(output) = outcome.output() {
                batch.outputs.push(ToolOutput {
                    tool_call_id: call.id.clone(),
                    output,
                });
            }
            batch.records.push(DispatchRecord {
                call_id: call.id.clone(),
                tool_name: call.function.name.clone(),
                outcome,
            });
        }

        debug!(
            calls = calls.len(),
            outputs = batch.outputs.len(),
            "Tool batch dispatched"
        );
        batch
    }

    fn admit(&self, call: &ToolCall, state: &mut MintState) -> Admission {
        let name = call.function.name.as_str();
        let Some(handler) = self.handlers.get(name) else {
            warn!(tool = %name, call_id = %call.id, "Unknown tool requested, skipping");
            return Admission::Skip;
        };

        if should_block(name, state) {
            warn!(call_id = %call.id, "Blocked repeated mint call");
            println!("[GUARD] Blocked duplicate {} call {}", name, call.id);
            MINT_GUARD_BLOCKS.inc();
            return Admission::Block;
        }
        if is_mint_action(name) {
            state.latch();
        }
        Admission::Run(Arc::clone(handler))
    }
}

async fn execute(handler: Arc<dyn ToolHandler>, call: &ToolCall) -> CallOutcome {
    let span = info_span!(
        "tool_call",
        tool = %call.function.name,
        call_id = %call.id,
        otel.name = "tool_call"
    );

    async {
        let args = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(message) => {
                warn!(error = %message, "Malformed tool arguments");
                return CallOutcome::Failed(message);
            }
        };

        let started = Instant::now();
        let result = handler.call(args).await;
        TOOL_CALL_DURATION
            .with_label_values(&[handler.name()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => CallOutcome::Executed(stringify_wide_integers(value)),
            Err(e) => {
                warn!(error = %e, "Tool handler failed");
                CallOutcome::Failed(e.to_string())
            }
        }
    }
    .instrument(span)
    .await
}

/// Arguments arrive as a JSON document in a string; blank means no arguments
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid tool arguments: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tool with a fixed answer that counts its calls
    struct StubTool {
        name: &'static str,
        answer: Result<Value, String>,
        calls: AtomicUsize,
    }

    impl StubTool {
        fn returning(name: &'static str, value: Value) -> Self {
            Self {
                name,
                answer: Ok(value),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, message: &str) -> Self {
            Self {
                name,
                answer: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolHandler for StubTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function(self.name, "stub", json!({"type": "object"}))
        }

        async fn call(&self, _args: Value) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().map_err(ToolError::Failed)
        }
    }

    fn dispatcher_with(tools: &[&Arc<StubTool>]) -> ToolDispatcher {
        let mut dispatcher = ToolDispatcher::new();
        for tool in tools {
            dispatcher.register(Arc::clone(*tool) as Arc<dyn ToolHandler>);
        }
        dispatcher
    }

    #[tokio::test]
    async fn test_unknown_tool_is_skipped() {
        let dispatcher = ToolDispatcher::new();
        let mut state = MintState::new();
        let call = ToolCall::new("call_1", "no-such-tool", json!({}));

        assert!(dispatcher.dispatch(&call, &mut state).await.is_none());
        assert!(!state.minting_completed);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_output() {
        let tool = Arc::new(StubTool::failing("get-balance", "rpc down"));
        let dispatcher = dispatcher_with(&[&tool]);
        let mut state = MintState::new();

        let output = dispatcher
            .dispatch(&ToolCall::new("c1", "get-balance", json!({})), &mut state)
            .await
            .unwrap();
        assert_eq!(output.tool_call_id, "c1");
        assert_eq!(output.output, "Error: rpc down");
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_handler_errors() {
        let tool = Arc::new(StubTool::returning("get-balance", json!({"ok": true})));
        let dispatcher = dispatcher_with(&[&tool]);
        let mut state = MintState::new();
        let mut call = ToolCall::new("c1", "get-balance", json!({}));
        call.function.arguments = "{not json".to_string();

        let output = dispatcher.dispatch(&call, &mut state).await.unwrap();
        assert!(output.output.starts_with("Error: invalid tool arguments"));
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn test_wide_integers_are_stringified() {
        let tool = Arc::new(StubTool::returning(
            "get-balance",
            json!({"balanceWei": u64::MAX, "decimals": 18}),
        ));
        let dispatcher = dispatcher_with(&[&tool]);
        let mut state = MintState::new();

        let output = dispatcher
            .dispatch(&ToolCall::new("c1", "get-balance", json!({})), &mut state)
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&output.output).unwrap();
        assert_eq!(parsed["balanceWei"], "18446744073709551615");
        assert_eq!(parsed["decimals"], 18);
    }

    #[tokio::test]
    async fn test_second_mint_in_same_batch_is_blocked() {
        let mint = Arc::new(StubTool::returning("mint-and-upload", json!({"success": true})));
        let dispatcher = dispatcher_with(&[&mint]);
        let mut state = MintState::new();
        let calls = vec![
            ToolCall::new("m1", "mint-and-upload", json!({})),
            ToolCall::new("m2", "mint-and-upload", json!({})),
        ];

        let batch = dispatcher.dispatch_batch(&calls, &mut state).await;

        assert_eq!(mint.calls(), 1);
        assert!(state.minting_completed);
        assert_eq!(batch.outputs.len(), 2);
        assert_eq!(batch.outputs[1].tool_call_id, "m2");
        let blocked: Value = serde_json::from_str(&batch.outputs[1].output).unwrap();
        assert_eq!(blocked, block_payload());
        assert_eq!(batch.records[1].outcome, CallOutcome::Blocked);
    }

    #[tokio::test]
    async fn test_failed_mint_still_latches() {
        let mint = Arc::new(StubTool::failing("mint-and-upload", "pin failed"));
        let dispatcher = dispatcher_with(&[&mint]);
        let mut state = MintState::new();

        dispatcher
            .dispatch(&ToolCall::new("m1", "mint-and-upload", json!({})), &mut state)
            .await;
        assert!(state.minting_completed);

        let second = dispatcher
            .dispatch(&ToolCall::new("m2", "mint-and-upload", json!({})), &mut state)
            .await
            .unwrap();
        assert_eq!(serde_json::from_str::<Value>(&second.output).unwrap(), block_payload());
        assert_eq!(mint.calls(), 1);
    }

    #[test]
    fn test_report_absorbs_records() {
        let mut report = RunReport::default();
        report.absorb(&[
            DispatchRecord {
                call_id: "a".into(),
                tool_name: GENERATE_IMAGE_TOOL.into(),
                outcome: CallOutcome::Executed(json!({"imageUrl": "https://img"})),
            },
            DispatchRecord {
                call_id: "b".into(),
                tool_name: "mint-and-upload".into(),
                outcome: CallOutcome::Failed("boom".into()),
            },
            DispatchRecord {
                call_id: "c".into(),
                tool_name: "mint-and-upload".into(),
                outcome: CallOutcome::Blocked,
            },
            DispatchRecord {
                call_id: "d".into(),
                tool_name: "mystery".into(),
                outcome: CallOutcome::Skipped,
            },
        ]);

        assert_eq!(report.image_url.as_deref(), Some("https://img"));
        assert_eq!(report.mint_error.as_deref(), Some("boom"));
        assert!(report.mint_attempted());
        assert_eq!(
            (report.executed, report.failed, report.blocked, report.skipped),
            (1, 1, 1, 1)
        );
    }

    #[test]
    fn test_definitions_sorted() {
        let a = Arc::new(StubTool::returning("get-balance", json!(null)));
        let b = Arc::new(StubTool::returning("check-payment", json!(null)));
        let dispatcher = dispatcher_with(&[&a, &b]);
        let names: Vec<String> = dispatcher
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["check-payment", "get-balance"]);
    }
}
