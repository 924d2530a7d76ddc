use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Channel-specific message ID.
    pub id: String,
    /// Channel identifier (e.g., "telegram").
    pub channel: String,
    /// Chat the message arrived in; used as the conversation key.
    pub chat_id: String,
    /// Sender identifier (channel-specific).
    pub sender: String,
    /// Display name of the sender.
    pub sender_name: Option<String>,
    /// Text content. Non-text updates (stickers, photos) carry `None`.
    pub text: Option<String>,
}

/// An outgoing message to send via a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel.
    pub channel: String,
    /// Target chat ID.
    pub target: String,
    /// Text content (may contain markdown).
    pub text: String,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            target: target.into(),
            text: text.into(),
        }
    }
}

/// Events emitted by a channel adapter.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A new message arrived.
    Message(IncomingMessage),
    /// The channel connected successfully.
    Connected,
    /// The channel disconnected.
    Disconnected(Option<String>),
}

/// Trait implemented by each channel adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique identifier for this channel instance.
    fn id(&self) -> &str;

    /// Channel type name (e.g., "telegram").
    fn channel_type(&self) -> &str;

    /// Start the channel adapter. Returns a receiver for incoming events.
    async fn start(&mut self) -> scout_core::Result<mpsc::Receiver<ChannelEvent>>;

    /// Send a message through this channel.
    async fn send(&self, message: OutgoingMessage) -> scout_core::Result<()>;

    /// Send a typing indicator.
    async fn send_typing(&self, target: &str) -> scout_core::Result<()>;

    /// Stop the channel adapter gracefully.
    async fn stop(&mut self) -> scout_core::Result<()>;

    /// Check if the channel is currently connected.
    fn is_connected(&self) -> bool;
}

/// Split `text` into chunks of at most `max_chars` characters, preferring to
/// break after a newline. Empty text yields a single placeholder chunk.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec!["(no response)".to_string()];
    }
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        // Break after the last newline in the back half of the window, if any.
        let cut = window
            .iter()
            .rposition(|c| *c == '\n')
            .filter(|pos| *pos >= max_chars / 2)
            .map(|pos| pos + 1)
            .unwrap_or(max_chars);
        chunks.push(rest[..cut].iter().collect());
        rest = rest.split_off(cut);
    }
    if !rest.is_empty() {
        chunks.push(rest.into_iter().collect());
    }
    chunks
}
