//! # scout-channels
//!
//! Chat transport adapters. Each adapter turns a messaging platform into a
//! stream of `{chat, text}` events and can send text back to a chat.
//! Authorization and command handling live in the runtime's gateway.

pub mod adapter;
pub mod telegram;

pub use adapter::{split_message, Channel, ChannelEvent, IncomingMessage, OutgoingMessage};
pub use telegram::TelegramChannel;
