//! # scout-config
//!
//! Configuration system for Scout. Reads from `scout.toml`, then applies
//! environment variable overrides.
//!
//! Supports hot-reload via filesystem watcher.

pub mod schema;
pub mod loader;

pub use schema::ScoutConfig;
pub use schema::{
    AgentConfig, ConfigWarning, InferenceConfig, LoggingConfig, ProvidersConfig, RepositoryConfig,
    ResearchConfig, TelegramConfig, WarningSeverity,
};
pub use loader::ConfigLoader;
