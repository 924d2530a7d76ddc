use tracing::warn;

use scout_channels::TelegramChannel;
use scout_config::ConfigLoader;
use scout_core::ScoutError;
use scout_runtime::{AllowList, ScoutRuntime};

pub(super) async fn cmd_start(config: scout_config::ScoutConfig, config_loader: ConfigLoader) -> scout_core::Result<()> {
    println!("🔭 Scout v{}", env!("CARGO_PKG_VERSION"));
    println!("   Model: {} via {}", config.inference.model, config.inference.base_url);
    println!("   Repository: {}", config.repository.root.display());

    let Some(token) = config.telegram.token.clone().filter(|t| !t.trim().is_empty()) else {
        eprintln!("⚠️  No Telegram bot token configured.");
        eprintln!("   In scout.toml:  [telegram]");
        eprintln!("                   token = \"123456:ABC...\"");
        eprintln!("   Or env var:     export TELEGRAM_BOT_TOKEN=123456:ABC...");
        eprintln!("   Use `scout chat` to talk to Scout from the terminal instead.");
        return Err(ScoutError::Config("telegram.token is not set".into()));
    };

    if config.telegram.allowed_chat_ids.is_empty() {
        println!("   Allowed chats: any (set telegram.allowed_chat_ids to restrict)");
    } else {
        println!("   Allowed chats: {}", config.telegram.allowed_chat_ids.join(", "));
    }
    if let Some(ref schedule) = config.research.schedule {
        println!("   Research schedule: {schedule}");
    }

    // Start config hot-reload watcher (kept alive for duration of runtime)
    let _watcher = match config_loader.watch() {
        Ok(w) => {
            println!("   Config hot-reload: enabled (allow-list)");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };
    println!();

    let runtime = ScoutRuntime::from_config(config)?;
    let channel = TelegramChannel::new("telegram", token);
    let allow = AllowList::live(config_loader.shared());

    runtime.serve(Box::new(channel), allow).await?;
    println!("👋 Scout stopped.");
    Ok(())
}
