#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use chrono::Utc;
    use scout_core::{Result, ScoutError};
    use scout_llm::mock::{MockFailure, MockInference};
    use scout_runtime::providers::{MarketSnapshot, PlayerAverages, SearchHit};
    use scout_runtime::research::{Fetched, recent_reports};
    use scout_runtime::{
        MarketProvider, Providers, ResearchPayload, ResearchRunner, ResearchSettings, SearchProvider, SportsProvider,
    };
    use tempfile::TempDir;

    fn unavailable(provider: &str, reason: &str) -> ScoutError {
        ScoutError::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Fails every query mentioning TSLA.
    struct FakeSearch {
        delay: Duration,
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        fn name(&self) -> &str {
            "fake-search"
        }

        async fn search(&self, query: &str, _max_results: u32) -> Result<Vec<SearchHit>> {
            tokio::time::sleep(self.delay).await;
            if query.contains("TSLA") {
                return Err(unavailable("fake-search", "HTTP 429: rate limited"));
            }
            Ok(vec![SearchHit {
                title: format!("About {query}"),
                url: "https://example.com/story".into(),
                snippet: "snippet".into(),
            }])
        }
    }

    struct FakeMarket;

    #[async_trait]
    impl MarketProvider for FakeMarket {
        fn name(&self) -> &str {
            "fake-market"
        }

        async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
            if symbol == "XYZ" {
                return Err(unavailable("fake-market", "no quote"));
            }
            Ok(MarketSnapshot {
                symbol: symbol.into(),
                as_of: Utc::now(),
                price: Some(231.4),
                day_high: None,
                day_low: None,
                year_high: None,
                year_low: None,
                volume: Some(1_000),
                options: None,
            })
        }
    }

    struct FakeSports;

    #[async_trait]
    impl SportsProvider for FakeSports {
        fn name(&self) -> &str {
            "fake-sports"
        }

        async fn recent_averages(&self, player_name: &str, games: u32) -> Result<Option<PlayerAverages>> {
            if player_name == "Nobody Atall" {
                return Ok(None);
            }
            let mut averages = BTreeMap::new();
            averages.insert("pts".to_string(), 27.5);
            Ok(Some(PlayerAverages {
                player: player_name.into(),
                sample_games: games as usize,
                averages,
            }))
        }
    }

    fn providers(search_delay: Duration) -> Providers {
        Providers {
            search: Arc::new(FakeSearch { delay: search_delay }),
            market: Arc::new(FakeMarket),
            sports: Arc::new(FakeSports),
        }
    }

    fn settings(dir: &TempDir) -> ResearchSettings {
        ResearchSettings {
            reports_dir: dir.path().join("reports"),
            model: "llama3.1:8b".into(),
            temperature: 0.2,
            max_web_results: 5,
            nba_games: 10,
            include_risk_section: true,
            watch_players: vec!["LeBron James".into(), "Nobody Atall".into()],
            watch_teams: vec!["Lakers".into()],
            nba_terms: vec!["injury report".into(), "player props".into()],
            watch_symbols: vec!["AAPL".into(), "TSLA".into(), "XYZ".into()],
            stock_terms: vec!["implied volatility".into()],
        }
    }

    #[tokio::test]
    async fn test_failed_providers_leave_markers() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockInference::new());
        let runner = ResearchRunner::new(providers(Duration::ZERO), mock, settings(&dir));

        let payload = runner.gather().await;
        // 2 players, 2 team searches, 3 symbols, 3 symbol searches.
        assert_eq!(payload.queries(), 10);
        // Nobody Atall, XYZ snapshot, TSLA search.
        assert_eq!(payload.failures(), 3);

        let tsla = payload.stocks.search.iter().find(|e| e.query == "TSLA implied volatility").unwrap();
        assert_eq!(
            tsla.results,
            Fetched::ProviderUnavailable {
                provider: "fake-search".into(),
                reason: "HTTP 429: rate limited".into(),
            }
        );
        let nobody = payload.nba.players.iter().find(|e| e.player == "Nobody Atall").unwrap();
        assert!(nobody.stats.is_unavailable());
        assert!(matches!(payload.stocks.symbols[0].snapshot, Fetched::Data(ref s) if s.symbol == "AAPL"));
        assert_eq!(payload.nba.search[0].query, "NBA Lakers injury report");
    }

    #[tokio::test]
    async fn test_queries_run_concurrently() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockInference::new());
        let runner = ResearchRunner::new(providers(Duration::from_millis(200)), mock, settings(&dir));

        let started = Instant::now();
        let payload = runner.gather().await;
        assert_eq!(payload.nba.search.len() + payload.stocks.search.len(), 5);
        // Five sequential searches would take a full second.
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_cycle_writes_memo_and_payload() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockInference::new().with_response("1) NBA Prop Research Signals\nLeBron is hot."));
        let runner = ResearchRunner::new(
            providers(Duration::ZERO),
            Arc::clone(&mock) as Arc<dyn scout_llm::InferenceClient>,
            settings(&dir),
        );

        let report = runner.run().await.unwrap();
        assert!(report.memo.contains("LeBron is hot."));

        let memo_name = report.memo_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(memo_name.starts_with("research_") && memo_name.ends_with(".md"));
        assert_eq!(report.payload_path, report.memo_path.with_extension("json"));
        assert_eq!(std::fs::read_to_string(&report.memo_path).unwrap(), report.memo);

        let written: ResearchPayload =
            serde_json::from_str(&std::fs::read_to_string(&report.payload_path).unwrap()).unwrap();
        assert_eq!(written, report.payload);
        let raw = std::fs::read_to_string(&report.payload_path).unwrap();
        assert!(raw.contains("\"provider_unavailable\""));

        // Exactly one synthesis call, carrying the payload and the risk section.
        let requests = mock.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("3) Risks and Invalidators"));
        assert!(prompt.contains("NBA Lakers injury report"));
    }

    #[tokio::test]
    async fn test_back_to_back_cycles_do_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockInference::new().with_response("first memo").with_response("second memo"));
        let runner = ResearchRunner::new(providers(Duration::ZERO), mock, settings(&dir));

        let first = runner.run().await.unwrap();
        let second = runner.run().await.unwrap();
        assert_ne!(first.memo_path, second.memo_path);
        assert_eq!(std::fs::read_to_string(&first.memo_path).unwrap(), "first memo");

        let recent = recent_reports(&runner.settings().reports_dir, 5).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], second.memo_path);
    }

    #[tokio::test]
    async fn test_synthesis_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockInference::new().with_error(MockFailure::Unavailable, "connection refused"));
        let runner = ResearchRunner::new(providers(Duration::ZERO), mock, settings(&dir));

        assert!(runner.run().await.is_err());
        assert!(recent_reports(&runner.settings().reports_dir, 5).await.is_empty());
    }
}
