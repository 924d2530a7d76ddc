//! Built-in tools exposed to the model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError, ToolContext, ToolHandler, ToolSpec};

use crate::guard::{Change, MutationGuard, MutationOutcome, MutationRequest};
use crate::providers::Providers;
use crate::registry::ToolRegistry;
use crate::research::ResearchRunner;

/// Characters of file content returned by `read_file`.
const MAX_READ_CHARS: usize = 12_000;
/// Characters of combined output returned by `run_shell`.
const MAX_SHELL_OUTPUT: usize = 6_000;

fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args[key].as_str().ok_or_else(|| ScoutError::ToolExecution {
        tool: tool.into(),
        reason: format!("missing '{key}' argument"),
    })
}

fn truncate_chars(text: &str, max: usize, marker: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str(marker);
    out
}

// ── Data tools ─────────────────────────────────────────────────

pub struct WebSearchTool {
    providers: Providers,
    default_results: u32,
}

impl WebSearchTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "web_search",
            "Search the web and return titles, URLs and snippets of matching pages.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1, "description": "Search query"},
                    "max_results": {"type": "integer", "minimum": 1, "maximum": 20, "description": "Number of results (default 5)"}
                },
                "required": ["query"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let query = str_arg("web_search", &args, "query")?;
        let max = args["max_results"].as_u64().map(|n| n as u32).unwrap_or(self.default_results);
        let hits = self.providers.search.search(query, max).await?;
        Ok(json!({ "query": query, "results": hits }))
    }
}

pub struct StockSnapshotTool {
    providers: Providers,
}

impl StockSnapshotTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "stock_snapshot",
            "Get the latest price, day and 52-week range, volume, and the nearest-expiry option chain \
             (top 5 calls and puts by open interest with implied volatility) for a stock symbol.",
            json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string", "minLength": 1, "description": "Ticker symbol, e.g. AAPL"}
                },
                "required": ["symbol"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for StockSnapshotTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let symbol = str_arg("stock_snapshot", &args, "symbol")?;
        let snapshot = self.providers.market.snapshot(symbol).await?;
        Ok(serde_json::to_value(snapshot)?)
    }
}

pub struct NbaStatsTool {
    providers: Providers,
    default_games: u32,
}

impl NbaStatsTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "nba_stats",
            "Average points, rebounds, assists, minutes, threes made and turnovers over an NBA player's recent games.",
            json!({
                "type": "object",
                "properties": {
                    "player_name": {"type": "string", "minLength": 1, "description": "Player name, e.g. Jayson Tatum"},
                    "games": {"type": "integer", "minimum": 1, "maximum": 82, "description": "Recent games to average (default 8)"}
                },
                "required": ["player_name"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for NbaStatsTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let player = str_arg("nba_stats", &args, "player_name")?;
        let games = args["games"].as_u64().map(|n| n as u32).unwrap_or(self.default_games);
        match self.providers.sports.recent_averages(player, games).await? {
            Some(averages) if averages.sample_games == 0 => Err(ScoutError::ToolExecution {
                tool: "nba_stats".into(),
                reason: format!("no recent stats available for {}", averages.player),
            }),
            Some(averages) => Ok(serde_json::to_value(averages)?),
            None => Err(ScoutError::ToolExecution {
                tool: "nba_stats".into(),
                reason: format!("player not found: {player}"),
            }),
        }
    }
}

pub struct ResearchCycleTool {
    runner: Arc<ResearchRunner>,
}

impl ResearchCycleTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "run_research_cycle",
            "Gather data for every watched player, team and symbol, write a research memo, and return it.",
            json!({"type": "object", "properties": {}}),
        )
    }
}

#[async_trait]
impl ToolHandler for ResearchCycleTool {
    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<Value> {
        let report = self.runner.run().await?;
        Ok(json!({
            "report_path": report.memo_path.display().to_string(),
            "payload_path": report.payload_path.display().to_string(),
            "queries": report.payload.queries(),
            "unavailable": report.payload.failures(),
            "memo": report.memo,
        }))
    }
}

// ── Repository tools ───────────────────────────────────────────

pub struct ReadFileTool {
    guard: MutationGuard,
}

impl ReadFileTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "read_file",
            "Read a text file from the repository. Paths are relative to the repository root.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "minLength": 1, "description": "Repository-relative path"}
                },
                "required": ["path"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let path = str_arg("read_file", &args, "path")?;
        let target = self.guard.resolve(path)?;
        let content = tokio::fs::read_to_string(&target).await.map_err(|e| ScoutError::ToolExecution {
            tool: "read_file".into(),
            reason: format!("{path}: {e}"),
        })?;
        Ok(Value::String(truncate_chars(&content, MAX_READ_CHARS, "\n... (truncated)")))
    }
}

pub struct ListDirectoryTool {
    guard: MutationGuard,
}

impl ListDirectoryTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "list_directory",
            "List a repository directory. Defaults to the repository root.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Repository-relative directory (default \".\")"}
                }
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for ListDirectoryTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let path = args["path"].as_str().filter(|p| !p.trim().is_empty()).unwrap_or(".");
        let dir = self.guard.resolve(path)?;
        let read_err = |e: std::io::Error| ScoutError::ToolExecution {
            tool: "list_directory".into(),
            reason: format!("{path}: {e}"),
        };

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(read_err)?;
        while let Some(entry) = reader.next_entry().await.map_err(read_err)? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == ".git" {
                continue;
            }
            let is_dir = entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(Value::String("(empty directory)".into()));
        }
        let lines: Vec<String> = entries
            .into_iter()
            .map(|(name, is_dir)| if is_dir { format!("[dir]  {name}") } else { format!("[file] {name}") })
            .collect();
        Ok(Value::String(lines.join("\n")))
    }
}

/// `write_file` and `edit_file`: every change goes through the guard.
pub struct MutateFileTool {
    guard: MutationGuard,
    validation_command: String,
    edit: bool,
}

impl MutateFileTool {
    pub fn write_spec() -> ToolSpec {
        ToolSpec::new(
            "write_file",
            "Create or overwrite a repository file. The change is validated and committed; \
             if validation fails it is reverted and the failure output is returned.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "minLength": 1, "description": "Repository-relative path"},
                    "content": {"type": "string", "description": "Complete new file content"},
                    "summary": {"type": "string", "description": "One-line description for the commit message"}
                },
                "required": ["path", "content"]
            }),
        )
    }

    pub fn edit_spec() -> ToolSpec {
        ToolSpec::new(
            "edit_file",
            "Replace one exact occurrence of `old` with `new` in a repository file. \
             Validated and committed like write_file.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "minLength": 1, "description": "Repository-relative path"},
                    "old": {"type": "string", "minLength": 1, "description": "Exact text to replace; must occur once"},
                    "new": {"type": "string", "description": "Replacement text"},
                    "summary": {"type": "string", "description": "One-line description for the commit message"}
                },
                "required": ["path", "old", "new"]
            }),
        )
    }

    fn name(&self) -> &'static str {
        if self.edit { "edit_file" } else { "write_file" }
    }
}

#[async_trait]
impl ToolHandler for MutateFileTool {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<Value> {
        let tool = self.name();
        let path = str_arg(tool, &args, "path")?;
        let change = if self.edit {
            Change::Edit {
                old: str_arg(tool, &args, "old")?.to_string(),
                new: str_arg(tool, &args, "new")?.to_string(),
            }
        } else {
            Change::Replace(str_arg(tool, &args, "content")?.to_string())
        };

        let outcome = self
            .guard
            .apply(MutationRequest {
                path: path.to_string(),
                change,
                validation_command: self.validation_command.clone(),
                conversation: ctx.conversation.clone(),
                tool_call_id: ctx.tool_call_id.clone(),
                summary: args["summary"].as_str().map(String::from),
                deadline: ctx.deadline,
            })
            .await?;

        match outcome {
            MutationOutcome::Committed { commit_id, path } => {
                Ok(json!({ "status": "committed", "path": path, "commit": commit_id }))
            }
            MutationOutcome::Unchanged => Ok(json!({ "status": "unchanged", "path": path })),
            MutationOutcome::ValidationFailed { details } => Err(ScoutError::ValidationFailed(details)),
            MutationOutcome::DeadlineExpired { details } => Err(ScoutError::ToolTimeout {
                tool: tool.into(),
                reason: details,
            }),
        }
    }

    fn honors_deadline(&self) -> bool {
        true
    }
}

pub struct RunShellTool {
    guard: MutationGuard,
    blocked: Vec<String>,
    timeout: Duration,
}

impl RunShellTool {
    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "run_shell",
            "Run a non-interactive shell command in the repository root and return its output. \
             Changes made this way are not validated or committed.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "minLength": 1, "description": "Command passed to sh -c"}
                },
                "required": ["command"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for RunShellTool {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<Value> {
        let command = str_arg("run_shell", &args, "command")?;
        if let Some(pattern) = self.blocked.iter().find(|b| command.contains(b.as_str())) {
            return Err(ScoutError::ToolExecution {
                tool: "run_shell".into(),
                reason: format!("command blocked for safety (matches '{pattern}')"),
            });
        }

        let _exclusive = self.guard.exclusive().await;
        info!(command = command, "executing shell command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(self.guard.root())
            // Pipe stdin to /dev/null so interactive commands fail fast instead of hanging
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ScoutError::ToolTimeout {
                tool: "run_shell".into(),
                reason: format!("no result after {:?}", self.timeout),
            })?
            .map_err(|e| ScoutError::ToolExecution {
                tool: "run_shell".into(),
                reason: e.to_string(),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push_str("\nSTDERR: ");
            text.push_str(&stderr);
        }
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            text.push_str(&format!("\nExit code: {code}"));
        }
        if text.trim().is_empty() {
            text = "(no output)".into();
        }
        Ok(Value::String(truncate_chars(&text, MAX_SHELL_OUTPUT, "\n... (truncated)")))
    }
}

/// Register the built-in tools in their fixed order.
pub fn builtin_registry(
    config: &ScoutConfig,
    providers: Providers,
    guard: MutationGuard,
    research: Arc<ResearchRunner>,
) -> Result<ToolRegistry> {
    let repo = &config.repository;
    let registry = ToolRegistry::builder()
        .with(
            WebSearchTool::spec(),
            Arc::new(WebSearchTool {
                providers: providers.clone(),
                default_results: config.research.max_web_results,
            }),
        )?
        .with(
            StockSnapshotTool::spec(),
            Arc::new(StockSnapshotTool {
                providers: providers.clone(),
            }),
        )?
        .with(
            NbaStatsTool::spec(),
            Arc::new(NbaStatsTool {
                providers,
                default_games: config.research.nba_games,
            }),
        )?
        .with(ReadFileTool::spec(), Arc::new(ReadFileTool { guard: guard.clone() }))?
        .with(
            MutateFileTool::write_spec(),
            Arc::new(MutateFileTool {
                guard: guard.clone(),
                validation_command: repo.validation_command.clone(),
                edit: false,
            }),
        )?
        .with(
            MutateFileTool::edit_spec(),
            Arc::new(MutateFileTool {
                guard: guard.clone(),
                validation_command: repo.validation_command.clone(),
                edit: true,
            }),
        )?
        .with(ListDirectoryTool::spec(), Arc::new(ListDirectoryTool { guard: guard.clone() }))?
        .with(
            RunShellTool::spec(),
            Arc::new(RunShellTool {
                guard,
                blocked: repo.blocked_commands.clone(),
                timeout: Duration::from_secs(repo.shell_timeout_secs),
            }),
        )?
        .with(ResearchCycleTool::spec(), Arc::new(ResearchCycleTool { runner: research }))?
        .build();
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5, "…"), "abc");
        assert_eq!(truncate_chars("abcdef", 3, "\n... (truncated)"), "abc\n... (truncated)");
    }

    #[test]
    fn test_specs_are_objects_with_unique_names() {
        let specs = [
            WebSearchTool::spec(),
            StockSnapshotTool::spec(),
            NbaStatsTool::spec(),
            ReadFileTool::spec(),
            MutateFileTool::write_spec(),
            MutateFileTool::edit_spec(),
            ListDirectoryTool::spec(),
            RunShellTool::spec(),
            ResearchCycleTool::spec(),
        ];
        let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert!(specs.iter().all(|s| s.parameters["type"] == "object"));
        names.sort();
        names.dedup();
        assert_eq!(names.len(), specs.len());
    }
}
