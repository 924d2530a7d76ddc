use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, mapped from `scout.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub agent: AgentConfig,
    pub inference: InferenceConfig,
    pub repository: RepositoryConfig,
    pub research: ResearchConfig,
    pub providers: ProvidersConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum inference round trips per inbound message before the loop
    /// stops with a budget-exhausted reply.
    pub max_iterations: u32,
    /// Turns kept per conversation; older turns are dropped from the front.
    pub max_history_turns: usize,
    /// Deadline for a single tool handler call.
    pub tool_timeout_secs: u64,
    /// Delay before the single inference retry.
    pub inference_retry_backoff_ms: u64,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_history_turns: 60,
            tool_timeout_secs: 900,
            inference_retry_backoff_ms: 1_000,
            system_prompt: None,
        }
    }
}

// ── Inference ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Ollama endpoint. Overridden by `OLLAMA_HOST`.
    pub base_url: String,
    /// Model tag, e.g. "llama3.1:8b".
    pub model: String,
    pub temperature: f32,
    /// Deadline for one `/api/chat` call.
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".into(),
            model: "llama3.1:8b".into(),
            temperature: 0.3,
            timeout_secs: 300,
        }
    }
}

// ── Repository ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Working tree the file and shell tools operate on.
    pub root: PathBuf,
    /// Run after every mutation; a non-zero exit reverts the change.
    pub validation_command: String,
    pub validation_timeout_secs: u64,
    /// Prepended to generated commit messages.
    pub commit_prefix: String,
    pub shell_timeout_secs: u64,
    /// Substrings that cause `run_shell` to refuse a command.
    pub blocked_commands: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            validation_command: "cargo check --quiet".into(),
            validation_timeout_secs: 600,
            commit_prefix: "scout:".into(),
            shell_timeout_secs: 120,
            blocked_commands: vec![
                "rm -rf /".into(),
                "sudo rm".into(),
                "mkfs".into(),
                "dd if=".into(),
                "> /dev/sd".into(),
            ],
        }
    }
}

// ── Research ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Where memos and raw payloads are written. Overridden by `REPORT_DIR`.
    pub reports_dir: PathBuf,
    /// Cron expression (with seconds) for headless cycles, e.g. "0 0 7 * * *".
    pub schedule: Option<String>,
    /// Chat that receives scheduled memos.
    pub notify_chat: Option<String>,
    /// Synthesis model; falls back to `inference.model`.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_web_results: u32,
    pub nba_games: u32,
    pub include_risk_section: bool,
    pub nba: NbaWatchlist,
    pub stocks: StockWatchlist,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("data/reports"),
            schedule: None,
            notify_chat: None,
            model: None,
            temperature: 0.2,
            max_web_results: 5,
            nba_games: 8,
            include_risk_section: true,
            nba: NbaWatchlist::default(),
            stocks: StockWatchlist::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NbaWatchlist {
    pub watch_players: Vec<String>,
    pub watch_teams: Vec<String>,
    pub query_terms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockWatchlist {
    pub watch_symbols: Vec<String>,
    pub query_terms: Vec<String>,
}

// ── Providers ──────────────────────────────────────────────────

/// External data provider keys and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Brave Search API key. Free keys are available at https://api.search.brave.com/
    pub brave_api_key: Option<String>,
    pub brave_base_url: String,
    pub balldontlie_api_key: Option<String>,
    pub balldontlie_base_url: String,
    pub yahoo_base_url: String,
    /// Per-request deadline for every provider call.
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            brave_api_key: None,
            brave_base_url: "https://api.search.brave.com/res/v1".into(),
            balldontlie_api_key: None,
            balldontlie_base_url: "https://api.balldontlie.io/v1".into(),
            yahoo_base_url: "https://query2.finance.yahoo.com".into(),
            timeout_secs: 20,
        }
    }
}

// ── Telegram ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather. Can also be set via TELEGRAM_BOT_TOKEN.
    pub token: Option<String>,
    /// Chat ids allowed to talk to the agent. Empty = everyone.
    pub allowed_chat_ids: Vec<String>,
}

impl TelegramConfig {
    pub fn is_allowed(&self, chat_id: &str) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.iter().any(|c| c == chat_id)
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl ScoutConfig {
    /// Model used for research synthesis.
    pub fn research_model(&self) -> &str {
        self.research
            .model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.inference.model)
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ScoutConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Inference ───
        if self.inference.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "inference.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to an installed Ollama tag, e.g. 'llama3.1:8b'".into()),
            });
        }
        if !self.inference.base_url.starts_with("http://") && !self.inference.base_url.starts_with("https://") {
            warnings.push(ConfigWarning {
                field: "inference.base_url".into(),
                message: format!("'{}' is not an http(s) URL", self.inference.base_url),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. 'http://127.0.0.1:11434'".into()),
            });
        }
        for (field, temperature) in [
            ("inference.temperature", self.inference.temperature),
            ("research.temperature", self.research.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("temperature {} is out of range", temperature),
                    severity: WarningSeverity::Error,
                    hint: Some("Temperature must be between 0.0 and 2.0".into()),
                });
            }
        }

        // ── Agent loop ───
        if self.agent.max_iterations == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_iterations".into(),
                message: "max_iterations is 0 — the agent could never call a tool".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 15".into()),
            });
        } else if self.agent.max_iterations > 50 {
            warnings.push(ConfigWarning {
                field: "agent.max_iterations".into(),
                message: format!("{} iterations per message is very high", self.agent.max_iterations),
                severity: WarningSeverity::Warning,
                hint: Some("Local models rarely need more than 15 round trips".into()),
            });
        }
        if self.agent.max_history_turns < 4 {
            warnings.push(ConfigWarning {
                field: "agent.max_history_turns".into(),
                message: format!("history window of {} turns drops tool results mid-task", self.agent.max_history_turns),
                severity: WarningSeverity::Warning,
                hint: Some("Keep at least a few dozen turns, e.g. 60".into()),
            });
        }
        if self.agent.tool_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "agent.tool_timeout_secs".into(),
                message: "tool timeout is 0 — every tool call would time out".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Repository ───
        if self.repository.validation_command.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "repository.validation_command".into(),
                message: "validation command is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Every self-modification is validated before commit, e.g. 'cargo check --quiet'".into()),
            });
        }

        if self.agent.tool_timeout_secs < self.repository.validation_timeout_secs {
            warnings.push(ConfigWarning {
                field: "agent.tool_timeout_secs".into(),
                message: format!(
                    "tool timeout ({}s) is shorter than the validation timeout ({}s)",
                    self.agent.tool_timeout_secs, self.repository.validation_timeout_secs
                ),
                severity: WarningSeverity::Warning,
                hint: Some("A write may report a timeout to the model and still commit afterwards".into()),
            });
        }

        // ── Research ───
        let research = &self.research;
        if research.nba.watch_players.is_empty()
            && research.nba.watch_teams.is_empty()
            && research.stocks.watch_symbols.is_empty()
        {
            warnings.push(ConfigWarning {
                field: "research".into(),
                message: "no players, teams or symbols configured — research cycles will be empty".into(),
                severity: WarningSeverity::Info,
                hint: Some("Add [research.nba] watch_players or [research.stocks] watch_symbols".into()),
            });
        }
        if research.schedule.is_some() && research.notify_chat.is_none() {
            warnings.push(ConfigWarning {
                field: "research.notify_chat".into(),
                message: "scheduled research has no chat to notify; reports are only written to disk".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }
        if research.max_web_results == 0 || research.max_web_results > 20 {
            warnings.push(ConfigWarning {
                field: "research.max_web_results".into(),
                message: format!("{} results per query is outside 1-20", research.max_web_results),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Providers ───
        if self.providers.brave_api_key.as_deref().unwrap_or("").is_empty() {
            warnings.push(ConfigWarning {
                field: "providers.brave_api_key".into(),
                message: "no Brave Search key — web search will report the provider as unavailable".into(),
                severity: WarningSeverity::Info,
                hint: Some("Get a free key at https://api.search.brave.com/ or set BRAVE_API_KEY".into()),
            });
        }

        // ── Telegram ───
        if self.telegram.token.is_some() && self.telegram.allowed_chat_ids.is_empty() {
            warnings.push(ConfigWarning {
                field: "telegram.allowed_chat_ids".into(),
                message: "allow-list is empty — any Telegram chat can drive the agent".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set TELEGRAM_ALLOWED_CHAT_IDS or telegram.allowed_chat_ids".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
