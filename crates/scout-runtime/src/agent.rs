//! The tool-calling agent loop.
//!
//! ```text
//!   AwaitingInput ──► Inferring ──FinalText──────────────► Done
//!                        ▲  │
//!                        │  └─ToolCallRequest─► ExecutingTools
//!                        └──────────(iteration < max)─────┘
//!                           (iteration == max) ──► Done (budget message)
//!   any inference failure after one retry ──► Failed
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, info, warn};

use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError, ToolContext, ToolErrorKind, ToolInvocation, ToolResult, Turn};
use scout_llm::{AssistantResponse, InferenceClient, InferenceRequest};

use crate::conversation::{ConversationStore, trim_to_window};
use crate::registry::ToolRegistry;

/// Extra wait for handlers that stop themselves at the deadline, so their
/// own result arrives before the loop gives up on them.
const DEADLINE_GRACE: Duration = Duration::from_secs(30);

/// Default system prompt. `{os}` and `{arch}` are filled in at startup.
const DEFAULT_SYSTEM_PROMPT_TEMPLATE: &str = r#"You are Scout, an autonomous research assistant and software engineer running locally on the user's machine ({os}/{arch}).

You have full access to your own repository and can read, modify, and improve it.

## Capabilities
- **Research**: search the web, pull stock and option-chain snapshots, fetch recent NBA player averages.
- **Repository**: read files, list directories, write or edit files. Every write is validated and committed automatically; a change that fails validation is reverted and the failure output is returned to you.
- **Shell**: run git, tests, or other non-interactive commands in the repository root.
- **Research cycle**: trigger a full gather-and-synthesize research run with `run_research_cycle`.

## Guidelines
1. Be concise but thorough.
2. When modifying code, read the file first and make targeted changes with `edit_file`.
3. Give every write a short `summary`; it becomes the commit subject.
4. Never fabricate data. If a tool returns an error, say so.
5. Work through multi-step tasks systematically and report what you changed."#;

pub fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT_TEMPLATE
        .replace("{os}", std::env::consts::OS)
        .replace("{arch}", std::env::consts::ARCH)
}

/// Limits and model settings for one loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub retry_backoff: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &ScoutConfig) -> Self {
        Self {
            model: config.inference.model.clone(),
            temperature: config.inference.temperature,
            system_prompt: config
                .agent
                .system_prompt
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(default_system_prompt),
            max_iterations: config.agent.max_iterations.max(1),
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
            retry_backoff: Duration::from_millis(config.agent.inference_retry_backoff_ms),
        }
    }
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    /// Completed inference → tools round trips.
    pub iterations: u32,
    pub tool_calls: usize,
    /// The run stopped at the iteration ceiling.
    pub budget_exhausted: bool,
}

enum LoopState {
    Inferring,
    ExecutingTools(Vec<ToolInvocation>),
    Done { text: String, budget_exhausted: bool },
}

/// Drives one conversation turn to a final answer.
pub struct AgentLoop {
    inference: Arc<dyn InferenceClient>,
    registry: Arc<ToolRegistry>,
    store: ConversationStore,
    settings: LoopSettings,
}

impl AgentLoop {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        registry: Arc<ToolRegistry>,
        store: ConversationStore,
        settings: LoopSettings,
    ) -> Self {
        Self {
            inference,
            registry,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run the loop for one inbound message.
    ///
    /// Runs for the same key queue behind each other. An inference failure
    /// that survives the retry ends the run with `InferenceExhausted`; turns
    /// appended before it stay in the history.
    pub async fn run(&self, key: &str, text: &str) -> Result<AgentReply> {
        let lock = self.store.run_lock(key).await;
        let _running = lock.lock().await;

        let (mut history, epoch) = self.store.snapshot(key).await;
        let user_turn = Turn::user(text);
        history.push(user_turn.clone());
        self.store.append(key, epoch, [user_turn]).await;

        let specs = self.registry.list_specs();
        let max = self.settings.max_iterations;
        let mut iterations = 0u32;
        let mut tool_calls = 0usize;
        let mut state = LoopState::Inferring;

        info!(conversation = %key, "agent loop started");

        loop {
            state = match state {
                LoopState::Inferring => {
                    trim_to_window(&mut history, self.store.max_turns());
                    let request = InferenceRequest {
                        model: self.settings.model.clone(),
                        system: Some(self.settings.system_prompt.clone()),
                        messages: history.clone(),
                        tools: specs.clone(),
                        temperature: self.settings.temperature,
                    };
                    match self.infer(key, &request).await? {
                        AssistantResponse::FinalText(text) => LoopState::Done {
                            text,
                            budget_exhausted: false,
                        },
                        AssistantResponse::ToolCallRequest { text, calls } => {
                            let turn = Turn::assistant_tool_calls(text, calls.clone());
                            self.record(key, epoch, &mut history, turn).await;
                            LoopState::ExecutingTools(calls)
                        }
                    }
                }

                LoopState::ExecutingTools(calls) => {
                    for call in &calls {
                        let result = self.dispatch(key, call).await;
                        tool_calls += 1;
                        self.record(key, epoch, &mut history, Turn::tool(&result)).await;
                    }
                    iterations += 1;
                    debug!(conversation = %key, iteration = iterations, "tool round complete");

                    if iterations >= max {
                        warn!(conversation = %key, iterations, "max agent iterations reached");
                        LoopState::Done {
                            text: format!(
                                "I stopped after {max} rounds of tool calls without reaching a final answer \
                                 (tool budget exhausted). Send another message to continue."
                            ),
                            budget_exhausted: true,
                        }
                    } else {
                        LoopState::Inferring
                    }
                }

                LoopState::Done { text, budget_exhausted } => {
                    self.record(key, epoch, &mut history, Turn::assistant(text.clone())).await;
                    info!(conversation = %key, iterations, tool_calls, "agent loop finished");
                    return Ok(AgentReply {
                        text,
                        iterations,
                        tool_calls,
                        budget_exhausted,
                    });
                }
            };
        }
    }

    async fn record(&self, key: &str, epoch: u64, history: &mut Vec<Turn>, turn: Turn) {
        history.push(turn.clone());
        self.store.append(key, epoch, [turn]).await;
    }

    /// One inference call with a single retry after the configured backoff.
    async fn infer(&self, key: &str, request: &InferenceRequest) -> Result<AssistantResponse> {
        match self.inference.complete(request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_inference_retryable() => {
                warn!(conversation = %key, error = %e, "inference failed; retrying once");
                tokio::time::sleep(self.settings.retry_backoff).await;
                self.inference.complete(request).await.map_err(|e| {
                    if e.is_inference_retryable() {
                        ScoutError::InferenceExhausted {
                            attempts: 2,
                            last: e.to_string(),
                        }
                    } else {
                        e
                    }
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Produce exactly one result for `call`, whatever the handler does.
    async fn dispatch(&self, key: &str, call: &ToolInvocation) -> ToolResult {
        let tool = match self.registry.lookup(&call.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(conversation = %key, tool = %call.tool_name, "model called an unknown tool");
                return ToolResult::failure(call, ToolErrorKind::UnknownTool, e.to_string());
            }
        };
        if let Err(e) = self.registry.validate(&call.tool_name, &call.arguments) {
            return ToolResult::failure(call, ToolErrorKind::ArgumentValidation, e.to_string());
        }

        let ctx = ToolContext {
            conversation: key.to_string(),
            tool_call_id: call.id.clone(),
            deadline: Some(Instant::now() + self.settings.tool_timeout),
        };
        info!(conversation = %key, tool = %call.tool_name, tool_call_id = %call.id, "executing tool");

        let handler = Arc::clone(&tool.handler);
        let wait = if handler.honors_deadline() {
            self.settings.tool_timeout + DEADLINE_GRACE
        } else {
            self.settings.tool_timeout
        };
        let run = AssertUnwindSafe(handler.call(&ctx, call.arguments.clone())).catch_unwind();
        match tokio::time::timeout(wait, run).await {
            Err(_) => ToolResult::failure(
                call,
                ToolErrorKind::Timeout,
                format!("{} did not finish within {:?}", call.tool_name, self.settings.tool_timeout),
            ),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %call.tool_name, panic = %message, "tool handler panicked");
                ToolResult::failure(call, ToolErrorKind::ToolExecution, format!("tool panicked: {message}"))
            }
            Ok(Ok(Err(e))) => {
                debug!(tool = %call.tool_name, error = %e, "tool returned an error");
                ToolResult::failure(call, e.tool_error_kind(), e.to_string())
            }
            Ok(Ok(Ok(payload))) => ToolResult::success(call, payload),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
