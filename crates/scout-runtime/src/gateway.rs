//! Chat command gateway shared by Telegram and the terminal REPL.
//!
//! Applies the allow-list, interprets slash commands, and runs everything
//! else through the agent loop.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError};
use scout_llm::InferenceClient;

use crate::agent::AgentLoop;
use crate::guard::MutationGuard;
use crate::research::recent_reports;

pub const HELP_TEXT: &str = "Scout is online.\n\n\
Send any message to chat, or use:\n\
/research — run a full research cycle\n\
/status — system health check\n\
/reset — clear conversation\n\
/improve <desc> — self-improve the codebase";

const RESEARCH_PROMPT: &str = "Run a full research cycle using run_research_cycle and summarise the key findings.";
const DEFAULT_IMPROVEMENT: &str = "general improvements";

/// A parsed inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Research,
    Status,
    Reset,
    Improve(String),
    Unknown(String),
    Message(String),
}

impl ChatCommand {
    /// Parse `/cmd[@bot] [args]`. Anything not starting with `/` is a message.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return ChatCommand::Message(text.to_string());
        };
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args = args.trim();
        match name.as_str() {
            "start" | "help" => ChatCommand::Start,
            "research" => ChatCommand::Research,
            "status" => ChatCommand::Status,
            "reset" => ChatCommand::Reset,
            "improve" if args.is_empty() => ChatCommand::Improve(DEFAULT_IMPROVEMENT.to_string()),
            "improve" => ChatCommand::Improve(args.to_string()),
            _ => ChatCommand::Unknown(name),
        }
    }
}

/// Where replies for one inbound message go.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// Chat keys allowed to drive the agent. Empty means everyone.
///
/// A live list reads `[telegram].allowed_chat_ids` from the shared config on
/// every check, so a hot-reloaded config takes effect on the next message.
#[derive(Clone, Default)]
pub struct AllowList {
    chats: Vec<String>,
    live: Option<Arc<RwLock<ScoutConfig>>>,
}

impl AllowList {
    pub fn new(chats: Vec<String>) -> Self {
        Self { chats, live: None }
    }

    pub fn live(config: Arc<RwLock<ScoutConfig>>) -> Self {
        Self {
            chats: Vec::new(),
            live: Some(config),
        }
    }

    pub fn is_allowed(&self, chat: &str) -> bool {
        match &self.live {
            Some(config) => {
                let config = config.read();
                let chats = &config.telegram.allowed_chat_ids;
                chats.is_empty() || chats.iter().any(|c| c == chat)
            }
            None => self.chats.is_empty() || self.chats.iter().any(|c| c == chat),
        }
    }

    pub fn check(&self, chat: &str) -> Result<()> {
        if self.is_allowed(chat) {
            Ok(())
        } else {
            Err(ScoutError::UnauthorizedChat(chat.to_string()))
        }
    }
}

pub struct Gateway {
    agent: Arc<AgentLoop>,
    inference: Arc<dyn InferenceClient>,
    guard: MutationGuard,
    allow: AllowList,
    reports_dir: PathBuf,
    validation_command: String,
}

impl Gateway {
    pub fn new(
        agent: Arc<AgentLoop>,
        inference: Arc<dyn InferenceClient>,
        guard: MutationGuard,
        allow: AllowList,
        reports_dir: PathBuf,
        validation_command: String,
    ) -> Self {
        Self {
            agent,
            inference,
            guard,
            allow,
            reports_dir,
            validation_command,
        }
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Handle one inbound message for `chat`.
    ///
    /// Returns `UnauthorizedChat` without replying when the chat is not on
    /// the allow-list. Loop failures are replied as plain text and are not
    /// returned as errors.
    pub async fn handle(&self, chat: &str, text: &str, responder: &dyn Responder) -> Result<()> {
        self.allow.check(chat)?;

        match ChatCommand::parse(text) {
            ChatCommand::Start => responder.reply(HELP_TEXT).await,
            ChatCommand::Reset => {
                self.agent.store().reset(chat).await;
                info!(conversation = %chat, "conversation reset by user");
                responder.reply("Conversation history cleared.").await
            }
            ChatCommand::Status => {
                let report = self.status(chat).await;
                responder.reply(&report).await
            }
            ChatCommand::Research => {
                responder.reply("Running research cycle, this may take a few minutes…").await?;
                self.run_agent(chat, RESEARCH_PROMPT, responder).await
            }
            ChatCommand::Improve(description) => {
                responder.reply(&format!("Working on: {description}")).await?;
                self.run_agent(chat, &improvement_prompt(&description), responder).await
            }
            ChatCommand::Unknown(name) => {
                responder
                    .reply(&format!("Unknown command /{name}. Send /start for the list of commands."))
                    .await
            }
            ChatCommand::Message(message) if message.is_empty() => Ok(()),
            ChatCommand::Message(message) => self.run_agent(chat, &message, responder).await,
        }
    }

    async fn run_agent(&self, chat: &str, prompt: &str, responder: &dyn Responder) -> Result<()> {
        match self.agent.run(chat, prompt).await {
            Ok(reply) => responder.reply(&reply.text).await,
            Err(e) => {
                warn!(conversation = %chat, error = %e, "agent loop failed");
                responder.reply(&format!("Error: {e}")).await
            }
        }
    }

    /// Health summary built locally, without a model round trip.
    pub async fn status(&self, chat: &str) -> String {
        let settings = self.agent.settings();
        let health = match self.inference.health_check().await {
            Ok(()) => "reachable".to_string(),
            Err(e) => format!("unreachable ({e})"),
        };
        let head = self
            .guard
            .head()
            .await
            .map(|h| h.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "no commits".into());

        let mut lines = vec![
            "Scout status".to_string(),
            format!("• inference ({}): {health}", self.inference.name()),
            format!("• model: {}", settings.model),
            format!("• repository: {} @ {head}", self.guard.root().display()),
            format!("• validation: {}", self.validation_command),
            format!("• tools: {}", self.agent.registry().names().join(", ")),
            format!("• this conversation: {} turns", self.agent.store().len(chat).await),
        ];

        let reports = recent_reports(&self.reports_dir, 3).await;
        if reports.is_empty() {
            lines.push(format!("• reports: none yet in {}", self.reports_dir.display()));
        } else {
            lines.push("• latest reports:".to_string());
            lines.extend(reports.iter().map(|p| format!("  {}", p.display())));
        }
        lines.join("\n")
    }
}

fn improvement_prompt(description: &str) -> String {
    format!(
        "Improve the codebase: {description}. Read the relevant files first, then make focused changes with \
         edit_file or write_file. Each change is validated and committed automatically; if validation fails the \
         change is reverted and you get the failure output. Explain what you changed, or why the change was rejected."
    )
}
