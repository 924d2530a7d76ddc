use std::io::Write;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tracing::error;

use scout_runtime::{AllowList, Responder, ScoutRuntime};

/// Prints replies as they arrive, so acknowledgements show up before the
/// loop finishes.
struct TerminalResponder;

#[async_trait]
impl Responder for TerminalResponder {
    async fn reply(&self, text: &str) -> scout_core::Result<()> {
        eprint!("\x1b[32mscout>\x1b[0m ");
        println!("{text}");
        std::io::stdout().flush().ok();
        Ok(())
    }
}

pub(super) async fn cmd_chat(config: scout_config::ScoutConfig, session: String) -> scout_core::Result<()> {
    println!("🔭 Scout Interactive Chat");
    println!("   Model: {}", config.inference.model);
    println!("   Type 'exit' or Ctrl+C to quit");
    println!("   Type '/start' for the list of commands");
    println!();

    let runtime = ScoutRuntime::from_config(config)?;
    // The terminal is trusted; the allow-list only guards Telegram chats.
    let gateway = runtime.gateway(AllowList::default());
    let responder = TerminalResponder;

    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();

    loop {
        eprint!("\x1b[36myou>\x1b[0m ");
        std::io::stderr().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" || trimmed == "/exit" {
            println!("👋 Goodbye!");
            break;
        }

        if let Err(e) = gateway.handle(&session, trimmed, &responder).await {
            error!(error = %e, "chat message failed");
            eprintln!("\x1b[31m❌ {e}\x1b[0m");
        }
    }

    Ok(())
}
