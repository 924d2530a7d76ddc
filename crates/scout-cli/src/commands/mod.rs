use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use scout_config::{ConfigLoader, ScoutConfig, WarningSeverity};
use scout_core::ScoutError;
use scout_llm::{InferenceClient, OllamaClient};
use scout_runtime::research::recent_reports;

mod chat;
mod research;
mod start;

/// 🔭 Scout: local research assistant that can improve its own repository
#[derive(Parser)]
#[command(name = "scout", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to scout.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve Telegram and scheduled research until Ctrl+C
    Start,
    /// Interactive chat in the terminal
    Chat {
        /// Conversation key to use (default "terminal")
        #[arg(short, long, default_value = "terminal")]
        session: String,
    },
    /// Run one research cycle and print where the report was written
    Research,
    /// Check the inference endpoint and list recent reports
    Status,
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> scout_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level.clone().unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&config.logging.format, &log_level);

        report_warnings(&config);

        match self.command {
            Commands::Start => start::cmd_start(config, config_loader).await,
            Commands::Chat { session } => chat::cmd_chat(config, session).await,
            Commands::Research => research::cmd_research(config).await,
            Commands::Status => Self::cmd_status(config).await,
            Commands::Config { json } => Self::cmd_config(config, json),
        }
    }

    async fn cmd_status(config: ScoutConfig) -> scout_core::Result<()> {
        println!("🔭 Scout v{}", env!("CARGO_PKG_VERSION"));
        println!();

        let client = OllamaClient::new(
            config.inference.base_url.clone(),
            Duration::from_secs(config.inference.timeout_secs),
        );
        match client.health_check().await {
            Ok(()) => println!("✅ Inference: {} reachable", config.inference.base_url),
            Err(e) => println!("❌ Inference: {e}"),
        }
        println!("   Model: {}", config.inference.model);
        println!("   Repository: {}", config.repository.root.display());
        println!("   Validation: {}", config.repository.validation_command);
        match &config.research.schedule {
            Some(schedule) => println!("   Research schedule: {schedule}"),
            None => println!("   Research schedule: (manual only)"),
        }

        let reports = recent_reports(&config.research.reports_dir, 5).await;
        println!();
        if reports.is_empty() {
            println!("No reports yet in {}", config.research.reports_dir.display());
        } else {
            println!("Recent reports:");
            for report in reports {
                println!("  {}", report.display());
            }
        }
        Ok(())
    }

    fn cmd_config(config: ScoutConfig, json: bool) -> scout_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| ScoutError::Config(e.to_string()))?
            );
        }
        Ok(())
    }
}

fn init_tracing(format: &str, level: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    };

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .compact()
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .pretty()
            .with_target(false)
            .init(),
    }
}

/// Print config warnings once at startup. Errors already aborted loading.
fn report_warnings(config: &ScoutConfig) {
    let Ok(warnings) = config.validate() else {
        return;
    };
    for warning in warnings.iter().filter(|w| w.severity == WarningSeverity::Warning) {
        eprintln!("⚠️  {warning}");
    }
}
