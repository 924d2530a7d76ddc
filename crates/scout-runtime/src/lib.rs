//! # scout-runtime
//!
//! The agent runtime: the tool-calling loop, guarded writes to the
//! repository, research cycles, and chat command handling.
//!
//! ## Architecture
//!
//! ```text
//!        Telegram / terminal
//!               │ {chat, text}
//!               ▼
//!        ┌──────────────┐
//!        │   Gateway    │  ← allow-list, slash commands
//!        └──────┬───────┘
//!               ▼
//!        ┌──────────────┐      ┌──────────────┐
//!        │  Agent Loop  │ ───► │  Inference   │
//!        └──────┬───────┘      └──────────────┘
//!               │ tool calls
//!               ▼
//!        ┌──────────────┐
//!        │ ToolRegistry │
//!        └──────┬───────┘
//!      ┌────────┼─────────────┐
//!      ▼        ▼             ▼
//!  Providers  Mutation    Research
//!             Guard        Runner
//! ```

pub mod agent;
pub mod conversation;
pub mod gateway;
pub mod guard;
pub mod providers;
pub mod registry;
pub mod research;
pub mod runtime;
pub mod scheduler;
pub mod tools;

pub use agent::{AgentLoop, AgentReply, LoopSettings, default_system_prompt};
pub use conversation::ConversationStore;
pub use gateway::{AllowList, ChatCommand, Gateway, Responder};
pub use guard::{Change, MutationGuard, MutationOutcome, MutationRequest};
pub use providers::{MarketProvider, Providers, SearchProvider, SportsProvider};
pub use registry::{RegisteredTool, ToolRegistry, ToolRegistryBuilder};
pub use research::{ResearchPayload, ResearchReport, ResearchRunner, ResearchSettings};
pub use runtime::{BufferedResponder, ChannelResponder, ScoutRuntime};
pub use scheduler::{CronScheduler, ScheduledJob, SchedulerEvent};
pub use tools::builtin_registry;
