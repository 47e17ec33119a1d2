//! In-memory doubles for the backend, tools and chain reads
//!
//! Shared by the integration tests; nothing here touches the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use mintforge::assistant::types::{RequiredAction, SubmitToolOutputs};
use mintforge::assistant::{
    Assistant, AssistantBackend, AssistantSpec, BackendError, ContentBlock, Role, Run, RunError,
    RunStatus, Thread, ThreadMessage, ToolCall, ToolDefinition, ToolOutput,
};
use mintforge::chain::{Address, BlockTag, ChainError, CreditRecord, PaymentReads, U256};
use mintforge::credits::CreditReader;
use mintforge::tools::{ToolError, ToolHandler};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run in `status` with no pending action
pub fn run_with_status(status: RunStatus) -> Run {
    Run {
        id: ScriptedBackend::RUN_ID.to_string(),
        thread_id: ScriptedBackend::THREAD_ID.to_string(),
        status,
        required_action: None,
        last_error: None,
    }
}

/// Run waiting on `calls`
pub fn run_requiring(calls: Vec<ToolCall>) -> Run {
    Run {
        required_action: Some(RequiredAction {
            action_type: "submit_tool_outputs".to_string(),
            submit_tool_outputs: SubmitToolOutputs { tool_calls: calls },
        }),
        ..run_with_status(RunStatus::RequiresAction)
    }
}

/// Failed run carrying `reason`
pub fn failed_run(reason: &str) -> Run {
    Run {
        last_error: Some(RunError {
            code: "server_error".to_string(),
            message: reason.to_string(),
        }),
        ..run_with_status(RunStatus::Failed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversational backend
// ─────────────────────────────────────────────────────────────────────────────

/// Backend that replays a fixed sequence of run states
///
/// `latest_run` and `submit_tool_outputs` both advance the script; once it is
/// exhausted the last state repeats.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Run>>,
    last: Mutex<Option<Run>>,
    thread_id: String,
    reply: Option<Vec<ContentBlock>>,
    fail_run_start: bool,
    fail_submit: bool,
    messages: Mutex<Vec<ThreadMessage>>,
    submitted: Mutex<Vec<Vec<ToolOutput>>>,
    assistants_created: AtomicUsize,
    latest_run_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub const THREAD_ID: &'static str = "thread_test";
    pub const ASSISTANT_ID: &'static str = "asst_test";
    pub const RUN_ID: &'static str = "run_test";

    pub fn new(script: Vec<Run>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            thread_id: Self::THREAD_ID.to_string(),
            reply: None,
            fail_run_start: false,
            fail_submit: false,
            messages: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            assistants_created: AtomicUsize::new(0),
            latest_run_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_thread_id(mut self, id: &str) -> Self {
        self.thread_id = id.to_string();
        self
    }

    /// Assistant message listed once the run completes
    pub fn with_reply(mut self, text: &str) -> Self {
        self.reply = Some(vec![ContentBlock::text(text)]);
        self
    }

    /// Newest assistant message has no content blocks
    pub fn with_empty_reply(mut self) -> Self {
        self.reply = Some(Vec::new());
        self
    }

    /// Make `create_run` answer with a 503
    pub fn with_run_start_failure(mut self) -> Self {
        self.fail_run_start = true;
        self
    }

    /// Make `submit_tool_outputs` answer with a 502 after recording the batch
    pub fn with_submit_failure(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    pub fn user_messages(&self) -> Vec<String> {
        self.messages_by(Role::User)
    }

    /// Assistant messages appended through `add_message`
    pub fn assistant_messages(&self) -> Vec<String> {
        self.messages_by(Role::Assistant)
    }

    pub fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        lock(&self.submitted).clone()
    }

    pub fn assistants_created(&self) -> usize {
        self.assistants_created.load(Ordering::SeqCst)
    }

    pub fn latest_run_calls(&self) -> usize {
        self.latest_run_calls.load(Ordering::SeqCst)
    }

    fn messages_by(&self, role: Role) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter(|message| message.role == role)
            .filter_map(|message| message.content.first()?.as_text().map(str::to_string))
            .collect()
    }

    fn advance(&self) -> Option<Run> {
        let next = lock(&self.script).pop_front();
        let mut last = lock(&self.last);
        if let Some(run) = next {
            *last = Some(run);
        }
        last.clone()
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_assistant(&self, _spec: &AssistantSpec) -> Result<Assistant, BackendError> {
        self.assistants_created.fetch_add(1, Ordering::SeqCst);
        Ok(Assistant {
            id: Self::ASSISTANT_ID.to_string(),
        })
    }

    async fn create_thread(&self) -> Result<Thread, BackendError> {
        Ok(Thread {
            id: self.thread_id.clone(),
        })
    }

    async fn add_message(
        &self,
        _thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ThreadMessage, BackendError> {
        let mut messages = lock(&self.messages);
        let message = ThreadMessage {
            id: format!("msg_{}", messages.len() + 1),
            role,
            content: vec![ContentBlock::text(content)],
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run, BackendError> {
        if self.fail_run_start {
            return Err(BackendError::Status {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(Run {
            thread_id: thread_id.to_string(),
            ..run_with_status(RunStatus::Queued)
        })
    }

    async fn latest_run(&self, _thread_id: &str) -> Result<Option<Run>, BackendError> {
        self.latest_run_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.advance())
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run, BackendError> {
        lock(&self.submitted).push(outputs);
        if self.fail_submit {
            return Err(BackendError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        self.advance()
            .ok_or_else(|| BackendError::Invalid("script exhausted".to_string()))
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let mut listed = lock(&self.messages).clone();
        if let Some(reply) = &self.reply {
            listed.push(ThreadMessage {
                id: "msg_reply".to_string(),
                role: Role::Assistant,
                content: reply.clone(),
            });
        }
        listed.reverse();
        Ok(listed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Tool with a fixed answer and a call counter
pub struct StubTool {
    name: &'static str,
    answer: Result<Value, String>,
    calls: AtomicUsize,
}

impl StubTool {
    pub fn returning(name: &'static str, value: Value) -> Self {
        Self {
            name,
            answer: Ok(value),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str, message: &str) -> Self {
        Self {
            name,
            answer: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for StubTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name, "stub", json!({"type": "object", "properties": {}}))
    }

    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(ToolError::Failed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chain reads
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted credit read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Path answered with this many credits (`can_mint` follows the count)
    Credits(u64),
    /// Path answered without a value
    Empty,
    /// Path failed
    Down,
}

/// Credit read path that replays a script; the last reading repeats
pub struct StubCreditReader {
    script: Mutex<VecDeque<Reading>>,
    last: Mutex<Reading>,
    reads: AtomicUsize,
}

impl StubCreditReader {
    pub fn new(script: Vec<Reading>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Reading::Empty),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn always(reading: Reading) -> Self {
        Self::new(vec![reading])
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreditReader for StubCreditReader {
    async fn read(&self, _user: &Address) -> Result<Option<CreditRecord>, ChainError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let reading = {
            let mut last = lock(&self.last);
            if let Some(next) = lock(&self.script).pop_front() {
                *last = next;
            }
            *last
        };
        match reading {
            Reading::Credits(count) => Ok(Some(CreditRecord {
                can_mint: count > 0,
                paid_token_count: count,
            })),
            Reading::Empty => Ok(None),
            Reading::Down => Err(ChainError::Rpc {
                method: "eth_call".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Fixed payment contract reads
pub struct StubPaymentReads {
    pub block: u64,
    pub price: U256,
    pub record: CreditRecord,
    down: bool,
    tags: Mutex<Vec<BlockTag>>,
}

impl StubPaymentReads {
    pub fn new(price: U256, record: CreditRecord) -> Self {
        Self {
            block: 100,
            price,
            record,
            down: false,
            tags: Mutex::new(Vec::new()),
        }
    }

    /// Every read fails as if the endpoint were unreachable
    pub fn unavailable() -> Self {
        Self {
            down: true,
            ..Self::new(
                U256::ZERO,
                CreditRecord {
                    can_mint: false,
                    paid_token_count: 0,
                },
            )
        }
    }

    fn check(&self) -> Result<(), ChainError> {
        if self.down {
            return Err(ChainError::Rpc {
                method: "eth_call".to_string(),
                message: "down".to_string(),
            });
        }
        Ok(())
    }

    /// Block tags `credit_record` was called with
    pub fn tags(&self) -> Vec<BlockTag> {
        lock(&self.tags).clone()
    }
}

#[async_trait]
impl PaymentReads for StubPaymentReads {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.check()?;
        Ok(self.block)
    }

    async fn mint_price(&self) -> Result<U256, ChainError> {
        self.check()?;
        Ok(self.price)
    }

    async fn credit_record(&self, _user: &Address, block: BlockTag) -> Result<CreditRecord, ChainError> {
        lock(&self.tags).push(block);
        self.check()?;
        Ok(self.record)
    }
}
