//! # scout-core
//!
//! Core types, traits, and primitives for the Scout automation agent.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{Result, ScoutError};
pub use message::{Role, Turn};
pub use tool::{ToolContext, ToolErrorKind, ToolHandler, ToolInvocation, ToolOutcome, ToolResult, ToolSpec};
pub use types::*;
