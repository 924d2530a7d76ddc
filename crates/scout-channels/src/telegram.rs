use async_trait::async_trait;
use scout_core::ScoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapter::*;

/// Telegram rejects messages over 4096 characters.
pub const TELEGRAM_CHUNK_CHARS: usize = 4000;

const MAX_BACKOFF_SECS: u64 = 60;
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Telegram channel adapter using the Bot API long-poll.
pub struct TelegramChannel {
    id: String,
    token: String,
    api_base: String,
    client: reqwest::Client,
    connected: Arc<AtomicBool>,
    shutdown_tx: Option<tokio::sync::watch::Sender<bool>>,
}

impl TelegramChannel {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        // The long-poll uses `timeout=30` server-side, so the request timeout
        // must be larger.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(45))
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            id: id.into(),
            token: token.into(),
            api_base: "https://api.telegram.org".into(),
            client,
            connected: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
        }
    }

    /// Point the adapter at a different Bot API server (self-hosted or test).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn bot_url(&self) -> String {
        format!("{}/bot{}", self.api_base, self.token)
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.bot_url(), method)
    }

    fn channel_error(reason: impl Into<String>) -> ScoutError {
        ScoutError::Channel {
            channel: "telegram".into(),
            reason: reason.into(),
        }
    }

    /// Send one chunk, trying Markdown first and plain text if Telegram rejects it.
    async fn send_chunk(&self, target: &str, text: &str) -> scout_core::Result<()> {
        let body_md = serde_json::json!({
            "chat_id": target,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body_md)
            .send()
            .await
            .map_err(|e| Self::channel_error(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(());
        }

        debug!("Telegram Markdown send failed, retrying as plain text");
        let body = serde_json::json!({
            "chat_id": target,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::channel_error(e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::channel_error(format!("sendMessage failed: {}", text)));
        }

        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> &str {
        "telegram"
    }

    async fn start(&mut self) -> scout_core::Result<mpsc::Receiver<ChannelEvent>> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let client = self.client.clone();
        let base_url = self.bot_url();
        let connected = Arc::clone(&self.connected);

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            connected.store(true, Ordering::SeqCst);
            let _ = event_tx.send(ChannelEvent::Connected).await;
            info!("Telegram channel connected, starting long-poll");

            let mut shutdown_rx = shutdown_rx;

            // Backoff grows on consecutive failures and resets on success
            let mut consecutive_failures: u32 = 0;
            let mut consecutive_conflicts: u32 = 0;
            let mut stop_reason: Option<String> = None;

            loop {
                if *shutdown_rx.borrow() {
                    info!("Telegram poll loop: shutdown requested");
                    break;
                }
                if event_tx.is_closed() {
                    info!("Telegram poll loop: event receiver dropped, stopping");
                    break;
                }

                let url = format!("{}/getUpdates?offset={}&timeout=30", base_url, offset);

                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        info!("Telegram poll loop: shutdown signal received");
                        break;
                    }

                    result = client.get(&url).send() => {
                        let resp = match result {
                            Ok(resp) => resp,
                            Err(e) if e.is_timeout() => {
                                debug!("Telegram long-poll timed out (normal, no updates)");
                                continue;
                            }
                            Err(e) => {
                                warn!(error = %e, "Telegram poll network error");
                                consecutive_failures += 1;
                                tokio::time::sleep(backoff_duration(consecutive_failures, MAX_BACKOFF_SECS)).await;
                                continue;
                            }
                        };

                        let status = resp.status();
                        let data = match resp.json::<serde_json::Value>().await {
                            Ok(data) => data,
                            Err(e) => {
                                // Could be an HTML error page from a proxy
                                warn!(status = %status, error = %e, "Telegram poll: failed to parse JSON response");
                                consecutive_failures += 1;
                                tokio::time::sleep(backoff_duration(consecutive_failures, MAX_BACKOFF_SECS)).await;
                                continue;
                            }
                        };

                        // Telegram wraps responses in {"ok": true/false, ...}
                        if data["ok"].as_bool() != Some(true) {
                            let desc = data["description"].as_str().unwrap_or("unknown error");
                            let code = data["error_code"].as_i64().unwrap_or(i64::from(status.as_u16()));

                            // 409 = another getUpdates consumer owns this token
                            if code == 409 {
                                consecutive_conflicts += 1;
                                error!(
                                    attempt = consecutive_conflicts,
                                    max = MAX_CONFLICT_RETRIES,
                                    description = %desc,
                                    "Telegram 409 Conflict: another bot instance is polling with the same token"
                                );
                                if consecutive_conflicts >= MAX_CONFLICT_RETRIES {
                                    stop_reason = Some("another instance owns this bot token".into());
                                    break;
                                }
                                tokio::time::sleep(Duration::from_secs(10)).await;
                                continue;
                            }

                            warn!(error_code = code, description = %desc, "Telegram API error response");
                            consecutive_failures += 1;
                            consecutive_conflicts = 0;

                            if code == 429 {
                                let retry_after = data["parameters"]["retry_after"].as_u64().unwrap_or(5);
                                warn!(retry_after, "Telegram rate limited, backing off");
                                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                            } else {
                                tokio::time::sleep(backoff_duration(consecutive_failures, MAX_BACKOFF_SECS)).await;
                            }
                            continue;
                        }

                        if consecutive_failures > 0 || consecutive_conflicts > 0 {
                            info!(
                                prev_failures = consecutive_failures,
                                prev_conflicts = consecutive_conflicts,
                                "Telegram poll recovered"
                            );
                        }
                        consecutive_failures = 0;
                        consecutive_conflicts = 0;

                        if let Some(updates) = data["result"].as_array() {
                            for update in updates {
                                if let Some(uid) = update["update_id"].as_i64() {
                                    offset = uid + 1;
                                }
                                if !dispatch_update(update, &event_tx).await {
                                    info!("Telegram poll loop: event receiver dropped during dispatch");
                                    connected.store(false, Ordering::SeqCst);
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ChannelEvent::Disconnected(stop_reason)).await;
            info!("Telegram channel disconnected");
        });

        Ok(event_rx)
    }

    async fn send(&self, message: OutgoingMessage) -> scout_core::Result<()> {
        let chunks = split_message(&message.text, TELEGRAM_CHUNK_CHARS);
        debug!(
            target = %message.target,
            text_len = message.text.len(),
            chunks = chunks.len(),
            "Telegram send"
        );
        for chunk in &chunks {
            self.send_chunk(&message.target, chunk).await?;
        }
        Ok(())
    }

    async fn send_typing(&self, target: &str) -> scout_core::Result<()> {
        let body = serde_json::json!({
            "chat_id": target,
            "action": "typing",
        });
        let _ = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&body)
            .send()
            .await;
        Ok(())
    }

    async fn stop(&mut self) -> scout_core::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Exponential backoff with jitter: 1s, 2s, 4s, 8s, … capped at `max_secs`.
fn backoff_duration(consecutive_failures: u32, max_secs: u64) -> Duration {
    let base = 1u64
        .checked_shl(consecutive_failures.min(6))
        .unwrap_or(max_secs);
    let capped = base.min(max_secs);
    // ±25% jitter
    let jitter_ms = (rand::random::<u64>() % (capped * 500 + 1)) as i64 - (capped as i64 * 250);
    let ms = (capped as i64 * 1000 + jitter_ms).max(500) as u64;
    Duration::from_millis(ms)
}

/// Turn a Telegram update into an [`IncomingMessage`], if it carries a message.
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let msg = update.get("message").or_else(|| update.get("edited_message"))?;
    let chat_id = msg["chat"]["id"].as_i64()?.to_string();
    Some(IncomingMessage {
        id: msg["message_id"].to_string(),
        channel: "telegram".into(),
        chat_id,
        sender: msg["from"]["id"].to_string(),
        sender_name: msg["from"]["first_name"].as_str().map(String::from),
        text: msg["text"].as_str().map(String::from),
    })
}

/// Dispatch a single Telegram update to the event channel.
/// Returns `false` if the event channel is closed (receiver dropped).
async fn dispatch_update(update: &serde_json::Value, event_tx: &mpsc::Sender<ChannelEvent>) -> bool {
    match parse_update(update) {
        Some(incoming) => event_tx.send(ChannelEvent::Message(incoming)).await.is_ok(),
        None => {
            debug!("skipping unrecognized Telegram update type");
            true
        }
    }
}
