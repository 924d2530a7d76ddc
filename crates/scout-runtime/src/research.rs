//! Research cycles: fan out to every configured provider query, synthesize
//! one memo through the inference client, and write the report to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError, Turn};
use scout_llm::{AssistantResponse, InferenceClient, InferenceRequest};

use crate::providers::{MarketSnapshot, PlayerAverages, Providers, SearchHit};

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are an autonomous research analyst. Use evidence from provided data only. \
Do not fabricate odds, lines, or prices. Provide uncertainty notes and risk controls.";

/// Result of one provider query, or the marker left when it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fetched<T> {
    Data(T),
    ProviderUnavailable { provider: String, reason: String },
}

impl<T> Fetched<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Fetched::Data(data),
            Err(ScoutError::ProviderUnavailable { provider, reason }) => Fetched::ProviderUnavailable { provider, reason },
            Err(e) => Fetched::ProviderUnavailable {
                provider: "unknown".into(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Fetched::ProviderUnavailable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub query: String,
    pub results: Fetched<Vec<SearchHit>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub player: String,
    pub stats: Fetched<PlayerAverages>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: String,
    pub snapshot: Fetched<MarketSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NbaSection {
    pub players: Vec<PlayerEntry>,
    pub search: Vec<SearchEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockSection {
    pub symbols: Vec<SymbolEntry>,
    pub search: Vec<SearchEntry>,
}

/// Everything gathered in one cycle; written verbatim as the `.json` report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPayload {
    pub generated_at: DateTime<Utc>,
    pub nba: NbaSection,
    pub stocks: StockSection,
}

impl ResearchPayload {
    /// Number of provider queries that left an unavailable marker.
    pub fn failures(&self) -> usize {
        let searches = self
            .nba
            .search
            .iter()
            .chain(&self.stocks.search)
            .filter(|e| e.results.is_unavailable())
            .count();
        let players = self.nba.players.iter().filter(|e| e.stats.is_unavailable()).count();
        let symbols = self.stocks.symbols.iter().filter(|e| e.snapshot.is_unavailable()).count();
        searches + players + symbols
    }

    pub fn queries(&self) -> usize {
        self.nba.search.len() + self.nba.players.len() + self.stocks.search.len() + self.stocks.symbols.len()
    }
}

#[derive(Debug, Clone)]
pub struct ResearchReport {
    pub memo: String,
    pub payload: ResearchPayload,
    pub memo_path: PathBuf,
    pub payload_path: PathBuf,
}

/// Watchlists and synthesis settings for a cycle.
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub reports_dir: PathBuf,
    pub model: String,
    pub temperature: f32,
    pub max_web_results: u32,
    pub nba_games: u32,
    pub include_risk_section: bool,
    pub watch_players: Vec<String>,
    pub watch_teams: Vec<String>,
    pub nba_terms: Vec<String>,
    pub watch_symbols: Vec<String>,
    pub stock_terms: Vec<String>,
}

impl ResearchSettings {
    pub fn from_config(config: &ScoutConfig) -> Self {
        let research = &config.research;
        Self {
            reports_dir: research.reports_dir.clone(),
            model: config.research_model().to_string(),
            temperature: research.temperature,
            max_web_results: research.max_web_results,
            nba_games: research.nba_games,
            include_risk_section: research.include_risk_section,
            watch_players: research.nba.watch_players.clone(),
            watch_teams: research.nba.watch_teams.clone(),
            nba_terms: research.nba.query_terms.clone(),
            watch_symbols: research.stocks.watch_symbols.clone(),
            stock_terms: research.stocks.query_terms.clone(),
        }
    }
}

pub struct ResearchRunner {
    providers: Providers,
    inference: Arc<dyn InferenceClient>,
    settings: ResearchSettings,
}

impl ResearchRunner {
    pub fn new(providers: Providers, inference: Arc<dyn InferenceClient>, settings: ResearchSettings) -> Self {
        Self {
            providers,
            inference,
            settings,
        }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Run a full cycle: gather, synthesize, persist.
    pub async fn run(&self) -> Result<ResearchReport> {
        let payload = self.gather().await;
        info!(
            queries = payload.queries(),
            failures = payload.failures(),
            "research data gathered"
        );

        let memo = self.synthesize(&payload).await?;
        let (memo_path, payload_path) = write_report(&self.settings.reports_dir, &memo, &payload).await?;
        info!(report = %memo_path.display(), "research report written");

        Ok(ResearchReport {
            memo,
            payload,
            memo_path,
            payload_path,
        })
    }

    /// Query every provider concurrently. Failures become markers.
    pub async fn gather(&self) -> ResearchPayload {
        let s = &self.settings;
        let team_queries = cross(&s.watch_teams, &s.nba_terms, |team, term| format!("NBA {team} {term}"));
        let symbol_queries = cross(&s.watch_symbols, &s.stock_terms, |symbol, term| format!("{symbol} {term}"));

        let players = join_all(s.watch_players.iter().map(|player| async move {
            let stats = match self.providers.sports.recent_averages(player, s.nba_games).await {
                Ok(Some(averages)) => Fetched::Data(averages),
                Ok(None) => Fetched::ProviderUnavailable {
                    provider: self.providers.sports.name().to_string(),
                    reason: "player not found".into(),
                },
                Err(e) => Fetched::from_result(Err(e)),
            };
            PlayerEntry {
                player: player.clone(),
                stats,
            }
        }));
        let symbols = join_all(s.watch_symbols.iter().map(|symbol| async move {
            SymbolEntry {
                symbol: symbol.clone(),
                snapshot: Fetched::from_result(self.providers.market.snapshot(symbol).await),
            }
        }));

        let (players, nba_search, symbols, stock_search) = tokio::join!(
            players,
            self.search_all(team_queries),
            symbols,
            self.search_all(symbol_queries)
        );

        ResearchPayload {
            generated_at: Utc::now(),
            nba: NbaSection {
                players,
                search: nba_search,
            },
            stocks: StockSection {
                symbols,
                search: stock_search,
            },
        }
    }

    async fn search_all(&self, queries: Vec<String>) -> Vec<SearchEntry> {
        let max = self.settings.max_web_results;
        join_all(queries.into_iter().map(|query| async move {
            let results = Fetched::from_result(self.providers.search.search(&query, max).await);
            if results.is_unavailable() {
                warn!(query = %query, "web search unavailable");
            }
            SearchEntry { query, results }
        }))
        .await
    }

    /// One inference call turning the payload into a memo.
    async fn synthesize(&self, payload: &ResearchPayload) -> Result<String> {
        let request = InferenceRequest {
            model: self.settings.model.clone(),
            system: Some(SYNTHESIS_SYSTEM_PROMPT.to_string()),
            messages: vec![Turn::user(synthesis_prompt(payload, self.settings.include_risk_section)?)],
            tools: vec![],
            temperature: self.settings.temperature,
        };
        let memo = match self.inference.complete(&request).await? {
            AssistantResponse::FinalText(text) => text,
            AssistantResponse::ToolCallRequest { text, .. } => text,
        };
        if memo.trim().is_empty() {
            return Ok("(the model returned an empty memo)".to_string());
        }
        Ok(memo)
    }
}

fn cross(left: &[String], right: &[String], f: impl Fn(&str, &str) -> String) -> Vec<String> {
    left.iter()
        .flat_map(|l| right.iter().map(|r| f(l, r)).collect::<Vec<_>>())
        .collect()
}

pub(crate) fn synthesis_prompt(payload: &ResearchPayload, include_risk_section: bool) -> Result<String> {
    let mut sections = vec!["NBA Prop Research Signals", "Stock Option Research Signals"];
    if include_risk_section {
        sections.push("Risks and Invalidators");
    }
    sections.push("Next Data To Collect");

    let numbered: Vec<String> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}) {s}", i + 1))
        .collect();

    Ok(format!(
        "Create a concise daily memo with sections:\n{}\n\nData payload JSON:\n{}",
        numbered.join("\n"),
        serde_json::to_string_pretty(payload)?
    ))
}

/// Write `research_YYYYMMDD_HHMMSS.md` and its `.json` sibling. A second
/// cycle within the same second gets a numeric suffix.
async fn write_report(dir: &Path, memo: &str, payload: &ResearchPayload) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

    let mut stem = format!("research_{stamp}");
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(format!("{stem}.md"))).await? {
        n += 1;
        stem = format!("research_{stamp}_{n}");
    }

    let memo_path = dir.join(format!("{stem}.md"));
    let payload_path = dir.join(format!("{stem}.json"));
    tokio::fs::write(&memo_path, memo).await?;
    tokio::fs::write(&payload_path, serde_json::to_string_pretty(payload)?).await?;
    Ok((memo_path, payload_path))
}

/// Most recent memo paths in `dir`, newest first.
pub async fn recent_reports(dir: &Path, limit: usize) -> Vec<PathBuf> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return vec![];
    };
    let mut reports = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("research_") && name.ends_with(".md") {
            reports.push(entry.path());
        }
    }
    // Timestamped names sort chronologically.
    reports.sort();
    reports.reverse();
    reports.truncate(limit);
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_payload() -> ResearchPayload {
        ResearchPayload {
            generated_at: Utc::now(),
            nba: NbaSection::default(),
            stocks: StockSection::default(),
        }
    }

    #[test]
    fn test_cross_product_queries() {
        let teams = vec!["Celtics".to_string(), "Knicks".to_string()];
        let terms = vec!["injury report".to_string()];
        let queries = cross(&teams, &terms, |t, q| format!("NBA {t} {q}"));
        assert_eq!(queries, vec!["NBA Celtics injury report", "NBA Knicks injury report"]);
    }

    #[test]
    fn test_synthesis_prompt_sections() {
        let with_risk = synthesis_prompt(&empty_payload(), true).unwrap();
        assert!(with_risk.contains("3) Risks and Invalidators"));
        assert!(with_risk.contains("4) Next Data To Collect"));
        let without = synthesis_prompt(&empty_payload(), false).unwrap();
        assert!(!without.contains("Risks and Invalidators"));
        assert!(without.contains("3) Next Data To Collect"));
    }

    #[test]
    fn test_unavailable_marker_serialization() {
        let entry = SearchEntry {
            query: "AAPL options flow".into(),
            results: Fetched::ProviderUnavailable {
                provider: "brave".into(),
                reason: "HTTP 429".into(),
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["results"]["provider_unavailable"]["provider"], "brave");
    }

    #[tokio::test]
    async fn test_write_report_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let payload = empty_payload();
        let (first, _) = write_report(dir.path(), "memo one", &payload).await.unwrap();
        let (second, second_json) = write_report(dir.path(), "memo two", &payload).await.unwrap();
        assert_ne!(first, second);
        assert!(second_json.extension().is_some_and(|e| e == "json"));
        assert_eq!(recent_reports(dir.path(), 10).await.len(), 2);
    }
}
