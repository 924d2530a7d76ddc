//! Public data providers: web search, market snapshots and NBA box scores.
//!
//! Each provider is a narrow async trait so the research runner and tools
//! can be exercised with in-memory fakes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use scout_config::ProvidersConfig;
use scout_core::{Result, ScoutError};

/// Option contracts kept per side of the chain.
const TOP_CONTRACTS: usize = 5;

/// Stat columns averaged by [`SportsProvider::recent_averages`].
pub const AVERAGED_STATS: [&str; 6] = ["pts", "reb", "ast", "min", "fg3m", "turnover"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: f64,
    pub last_price: Option<f64>,
    pub open_interest: Option<u64>,
    pub implied_volatility: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionExpiry {
    /// Expiration date, `YYYY-MM-DD`.
    pub expiration: String,
    pub top_calls_by_oi: Vec<OptionContract>,
    pub top_puts_by_oi: Vec<OptionContract>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub as_of: DateTime<Utc>,
    pub price: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
    pub volume: Option<u64>,
    /// Nearest expiry only.
    pub options: Option<OptionExpiry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAverages {
    pub player: String,
    pub sample_games: usize,
    pub averages: BTreeMap<String, f64>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait MarketProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot>;
}

#[async_trait]
pub trait SportsProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Averages over the player's most recent regular-season games.
    /// `Ok(None)` when no player matches the name.
    async fn recent_averages(&self, player_name: &str, games: u32) -> Result<Option<PlayerAverages>>;
}

/// The provider set shared by tools and the research runner.
#[derive(Clone)]
pub struct Providers {
    pub search: Arc<dyn SearchProvider>,
    pub market: Arc<dyn MarketProvider>,
    pub sports: Arc<dyn SportsProvider>,
}

impl Providers {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            search: Arc::new(BraveSearch {
                client: client.clone(),
                api_key: config.brave_api_key.clone().filter(|k| !k.is_empty()),
                base_url: config.brave_base_url.trim_end_matches('/').to_string(),
                timeout,
            }),
            market: Arc::new(YahooFinance {
                client: client.clone(),
                base_url: config.yahoo_base_url.trim_end_matches('/').to_string(),
                timeout,
            }),
            sports: Arc::new(BallDontLie {
                client,
                api_key: config.balldontlie_api_key.clone().filter(|k| !k.is_empty()),
                base_url: config.balldontlie_base_url.trim_end_matches('/').to_string(),
                timeout,
            }),
        }
    }
}

fn unavailable(provider: &str, reason: impl std::fmt::Display) -> ScoutError {
    ScoutError::ProviderUnavailable {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

/// Send a GET and decode the JSON body, mapping every failure to
/// `ProviderUnavailable`.
async fn get_json(provider: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let resp = request.send().await.map_err(|e| unavailable(provider, e))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(300).collect();
        return Err(unavailable(provider, format!("HTTP {status}: {body}")));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| unavailable(provider, format!("invalid JSON: {e}")))
}

// ── Brave Search ───────────────────────────────────────────────

pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<SearchHit>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| unavailable("brave", "no API key configured (set BRAVE_API_KEY)"))?;
        let count = max_results.clamp(1, 20);
        let count_param = count.to_string();

        info!(query = query, count = count, "executing web search");
        let data = get_json(
            "brave",
            self.client
                .get(format!("{}/web/search", self.base_url))
                .timeout(self.timeout)
                .header("Accept", "application/json")
                .header("X-Subscription-Token", api_key)
                .query(&[("q", query), ("count", count_param.as_str())]),
        )
        .await?;

        Ok(parse_brave_results(&data, count as usize))
    }
}

pub(crate) fn parse_brave_results(data: &Value, limit: usize) -> Vec<SearchHit> {
    data["web"]["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .take(limit)
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or("Untitled").to_string(),
                    url: r["url"].as_str().unwrap_or_default().to_string(),
                    snippet: r["description"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

// ── Yahoo Finance ──────────────────────────────────────────────

pub struct YahooFinance {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[async_trait]
impl MarketProvider for YahooFinance {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let symbol = symbol.trim().to_uppercase();
        debug!(symbol = %symbol, "fetching option chain");
        let data = get_json(
            "yahoo",
            self.client
                .get(format!("{}/v7/finance/options/{}", self.base_url, symbol))
                .timeout(self.timeout)
                .header("User-Agent", "Mozilla/5.0 (compatible; scout/0.1)"),
        )
        .await?;
        parse_option_chain(&symbol, &data)
    }
}

/// Parse a `/v7/finance/options/{symbol}` body into a snapshot of the quote
/// and the nearest expiry.
pub(crate) fn parse_option_chain(symbol: &str, data: &Value) -> Result<MarketSnapshot> {
    let result = &data["optionChain"]["result"][0];
    if !result.is_object() {
        let reason = data["optionChain"]["error"]["description"]
            .as_str()
            .unwrap_or("no data returned for symbol");
        return Err(unavailable("yahoo", format!("{symbol}: {reason}")));
    }

    let quote = &result["quote"];
    let chain = &result["options"][0];
    let options = chain["expirationDate"].as_i64().map(|ts| OptionExpiry {
        expiration: DateTime::from_timestamp(ts, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| ts.to_string()),
        top_calls_by_oi: top_by_open_interest(&chain["calls"]),
        top_puts_by_oi: top_by_open_interest(&chain["puts"]),
    });

    Ok(MarketSnapshot {
        symbol: symbol.to_string(),
        as_of: Utc::now(),
        price: quote["regularMarketPrice"].as_f64(),
        day_high: quote["regularMarketDayHigh"].as_f64(),
        day_low: quote["regularMarketDayLow"].as_f64(),
        year_high: quote["fiftyTwoWeekHigh"].as_f64(),
        year_low: quote["fiftyTwoWeekLow"].as_f64(),
        volume: quote["regularMarketVolume"].as_u64(),
        options,
    })
}

fn top_by_open_interest(contracts: &Value) -> Vec<OptionContract> {
    let mut contracts: Vec<OptionContract> = contracts
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|c| {
                    Some(OptionContract {
                        strike: c["strike"].as_f64()?,
                        last_price: c["lastPrice"].as_f64(),
                        open_interest: c["openInterest"].as_u64(),
                        implied_volatility: c["impliedVolatility"].as_f64(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    contracts.sort_by(|a, b| b.open_interest.unwrap_or(0).cmp(&a.open_interest.unwrap_or(0)));
    contracts.truncate(TOP_CONTRACTS);
    contracts
}

// ── balldontlie ────────────────────────────────────────────────

pub struct BallDontLie {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl BallDontLie {
    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .timeout(self.timeout);
        match &self.api_key {
            Some(key) => request.header("Authorization", key),
            None => request,
        }
    }
}

#[async_trait]
impl SportsProvider for BallDontLie {
    fn name(&self) -> &str {
        "balldontlie"
    }

    async fn recent_averages(&self, player_name: &str, games: u32) -> Result<Option<PlayerAverages>> {
        let players = get_json(
            "balldontlie",
            self.get("players").query(&[("search", player_name), ("per_page", "1")]),
        )
        .await?;

        let Some(player) = players["data"].as_array().and_then(|d| d.first()) else {
            return Ok(None);
        };
        let player_id = player["id"]
            .as_i64()
            .ok_or_else(|| unavailable("balldontlie", "player record without an id"))?;
        let full_name = format!(
            "{} {}",
            player["first_name"].as_str().unwrap_or_default(),
            player["last_name"].as_str().unwrap_or_default()
        )
        .trim()
        .to_string();

        debug!(player = %full_name, games, "fetching recent box scores");
        let stats = get_json(
            "balldontlie",
            self.get("stats").query(&[
                ("player_ids[]", player_id.to_string()),
                ("per_page", games.max(1).to_string()),
                ("postseason", "false".to_string()),
            ]),
        )
        .await?;

        let rows = stats["data"].as_array().cloned().unwrap_or_default();
        Ok(Some(average_stats(&full_name, &rows)))
    }
}

/// Average [`AVERAGED_STATS`] over box-score rows, rounded to two places.
pub(crate) fn average_stats(player: &str, rows: &[Value]) -> PlayerAverages {
    let mut averages = BTreeMap::new();
    if !rows.is_empty() {
        for key in AVERAGED_STATS {
            let total: f64 = rows.iter().map(|row| stat_value(&row[key])).sum();
            let mean = total / rows.len() as f64;
            averages.insert(key.to_string(), (mean * 100.0).round() / 100.0);
        }
    }
    PlayerAverages {
        player: player.to_string(),
        sample_games: rows.len(),
        averages,
    }
}

/// Numbers, numeric strings and `"MM:SS"` minutes; anything else counts as 0.
fn stat_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => match s.split_once(':') {
            Some((mins, secs)) => {
                mins.trim().parse::<f64>().unwrap_or(0.0) + secs.trim().parse::<f64>().unwrap_or(0.0) / 60.0
            }
            None => s.trim().parse().unwrap_or(0.0),
        },
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_brave_results() {
        let data = json!({"web": {"results": [
            {"title": "Celtics injury report", "url": "https://a", "description": "Tatum probable"},
            {"url": "https://b"},
            {"title": "third", "url": "https://c", "description": ""}
        ]}});
        let hits = parse_brave_results(&data, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "Tatum probable");
        assert_eq!(hits[1].title, "Untitled");
        assert!(parse_brave_results(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_parse_option_chain_sorts_by_open_interest() {
        let data = json!({"optionChain": {"result": [{
            "quote": {
                "regularMarketPrice": 190.5,
                "regularMarketDayHigh": 192.0,
                "regularMarketDayLow": 188.1,
                "fiftyTwoWeekHigh": 199.6,
                "fiftyTwoWeekLow": 164.0,
                "regularMarketVolume": 51234567u64
            },
            "options": [{
                "expirationDate": 1_760_659_200i64,
                "calls": [
                    {"strike": 180.0, "lastPrice": 11.2, "openInterest": 10, "impliedVolatility": 0.31},
                    {"strike": 190.0, "lastPrice": 3.4, "openInterest": 900, "impliedVolatility": 0.27},
                    {"lastPrice": 1.0}
                ],
                "puts": [{"strike": 185.0, "openInterest": 400}]
            }]
        }]}});
        let snap = parse_option_chain("AAPL", &data).unwrap();
        assert_eq!(snap.price, Some(190.5));
        assert_eq!(snap.volume, Some(51_234_567));
        let options = snap.options.unwrap();
        assert_eq!(options.expiration, "2025-10-17");
        assert_eq!(options.top_calls_by_oi.len(), 2);
        assert_eq!(options.top_calls_by_oi[0].strike, 190.0);
        assert_eq!(options.top_puts_by_oi[0].open_interest, Some(400));
    }

    #[test]
    fn test_parse_option_chain_unknown_symbol() {
        let data = json!({"optionChain": {"result": [], "error": {"description": "Not Found"}}});
        let err = parse_option_chain("ZZZZ", &data).unwrap_err();
        assert!(matches!(err, ScoutError::ProviderUnavailable { .. }));
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_average_stats() {
        let rows = vec![
            json!({"pts": 30, "reb": 8, "ast": 5, "min": "36:30", "fg3m": 4, "turnover": 2}),
            json!({"pts": 21, "reb": 11, "ast": 4, "min": "34", "fg3m": null, "turnover": 3}),
        ];
        let avg = average_stats("Jayson Tatum", &rows);
        assert_eq!(avg.sample_games, 2);
        assert_eq!(avg.averages["pts"], 25.5);
        assert_eq!(avg.averages["min"], 35.25);
        assert_eq!(avg.averages["fg3m"], 2.0);
    }

    #[test]
    fn test_average_stats_without_games() {
        let avg = average_stats("Rookie", &[]);
        assert_eq!(avg.sample_games, 0);
        assert!(avg.averages.is_empty());
    }
}
