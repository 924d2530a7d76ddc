//! Wires the components together and runs the long-lived service loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use scout_channels::{Channel, ChannelEvent, OutgoingMessage};
use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError};
use scout_llm::{InferenceClient, OllamaClient};

use crate::agent::{AgentLoop, LoopSettings};
use crate::conversation::ConversationStore;
use crate::gateway::{AllowList, Gateway, Responder};
use crate::guard::MutationGuard;
use crate::providers::Providers;
use crate::research::{ResearchReport, ResearchRunner, ResearchSettings};
use crate::scheduler::{CronScheduler, ScheduledJob, SchedulerEvent};
use crate::tools::builtin_registry;

/// Telegram typing indicators expire after about five seconds.
const TYPING_INTERVAL: Duration = Duration::from_secs(4);

/// Every long-lived component, built once from a config snapshot.
pub struct ScoutRuntime {
    config: ScoutConfig,
    inference: Arc<dyn InferenceClient>,
    guard: MutationGuard,
    research: Arc<ResearchRunner>,
    agent: Arc<AgentLoop>,
}

impl ScoutRuntime {
    /// Build against the configured Ollama endpoint and live data providers.
    pub fn from_config(config: ScoutConfig) -> Result<Self> {
        let inference: Arc<dyn InferenceClient> = Arc::new(OllamaClient::new(
            config.inference.base_url.clone(),
            Duration::from_secs(config.inference.timeout_secs),
        ));
        let providers = Providers::from_config(&config.providers);
        Self::with_parts(config, inference, providers)
    }

    /// Build with an explicit inference client and providers.
    pub fn with_parts(config: ScoutConfig, inference: Arc<dyn InferenceClient>, providers: Providers) -> Result<Self> {
        let guard = MutationGuard::from_config(&config.repository)?;
        let research = Arc::new(ResearchRunner::new(
            providers.clone(),
            Arc::clone(&inference),
            ResearchSettings::from_config(&config),
        ));
        let registry = Arc::new(builtin_registry(&config, providers, guard.clone(), Arc::clone(&research))?);
        let store = ConversationStore::new(config.agent.max_history_turns);
        let agent = Arc::new(AgentLoop::new(
            Arc::clone(&inference),
            registry,
            store,
            LoopSettings::from_config(&config),
        ));

        info!(
            model = %config.inference.model,
            repository = %guard.root().display(),
            tools = agent.registry().len(),
            "scout runtime assembled"
        );

        Ok(Self {
            config,
            inference,
            guard,
            research,
            agent,
        })
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    pub fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    /// A gateway over this runtime's agent with the given allow-list.
    pub fn gateway(&self, allow: AllowList) -> Gateway {
        Gateway::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.inference),
            self.guard.clone(),
            allow,
            self.config.research.reports_dir.clone(),
            self.config.repository.validation_command.clone(),
        )
    }

    /// Run one research cycle outside any conversation.
    pub async fn run_research_once(&self) -> Result<ResearchReport> {
        self.research.run().await
    }

    /// Serve `channel` until Ctrl+C or until its event stream closes,
    /// answering scheduled research jobs too.
    pub async fn serve(&self, mut channel: Box<dyn Channel>, allow: AllowList) -> Result<()> {
        let mut events = channel.start().await?;
        let mut channel: Arc<dyn Channel> = Arc::from(channel);
        let gateway = Arc::new(self.gateway(allow));
        // Every task holding a clone of `channel`; drained before `stop`.
        let mut tasks = JoinSet::new();

        let (scheduler, mut scheduled) = CronScheduler::new();
        scheduler.load_from_config(&self.config).await;
        tokio::spawn(scheduler.run());

        info!(channel = %channel.id(), "scout is listening");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ChannelEvent::Message(msg)) => {
                            let Some(text) = msg.text else {
                                debug!(chat = %msg.chat_id, "ignoring non-text message");
                                continue;
                            };
                            let gateway = Arc::clone(&gateway);
                            let channel = Arc::clone(&channel);
                            tasks.spawn(handle_message(gateway, channel, msg.chat_id, text));
                        }
                        Some(ChannelEvent::Connected) => info!(channel = %channel.id(), "channel connected"),
                        Some(ChannelEvent::Disconnected(reason)) => {
                            warn!(channel = %channel.id(), reason = ?reason, "channel disconnected");
                        }
                        None => {
                            warn!(channel = %channel.id(), "channel event stream closed, shutting down");
                            break;
                        }
                    }
                }

                Some(event) = scheduled.recv() => {
                    let research = Arc::clone(&self.research);
                    let channel = Arc::clone(&channel);
                    tasks.spawn(run_scheduled(research, channel, event));
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "message task failed");
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "cancelling in-flight messages");
            tasks.shutdown().await;
        }

        match Arc::get_mut(&mut channel) {
            Some(channel) => {
                if let Err(e) = channel.stop().await {
                    warn!(error = %e, "failed to stop channel");
                }
            }
            None => warn!(channel = %channel.id(), "channel still shared; skipping stop"),
        }
        Ok(())
    }
}

async fn handle_message(gateway: Arc<Gateway>, channel: Arc<dyn Channel>, chat: String, text: String) {
    if !gateway.allow_list().is_allowed(&chat) {
        warn!(chat = %chat, "dropping message from chat not on the allow-list");
        return;
    }

    // Runs alongside the reply and is dropped with it, so a cancelled
    // message leaves no typing loop holding the channel.
    let typing = async {
        loop {
            let _ = channel.send_typing(&chat).await;
            tokio::time::sleep(TYPING_INTERVAL).await;
        }
    };

    let responder = ChannelResponder::new(Arc::clone(&channel), chat.clone());
    let result = tokio::select! {
        result = gateway.handle(&chat, &text, &responder) => result,
        _ = typing => Ok(()),
    };
    match result {
        Ok(()) => {}
        Err(ScoutError::UnauthorizedChat(chat)) => {
            warn!(chat = %chat, "dropping message from chat not on the allow-list");
        }
        Err(e) => error!(chat = %chat, error = %e, "failed to handle message"),
    }
}

async fn run_scheduled(research: Arc<ResearchRunner>, channel: Arc<dyn Channel>, event: SchedulerEvent) {
    info!(task_id = %event.task_id, label = %event.label, "running scheduled job");
    let ScheduledJob::ResearchCycle { notify_chat } = event.job;

    let text = match research.run().await {
        Ok(report) => format!("{}\n\nReport: {}", report.memo, report.memo_path.display()),
        Err(e) => {
            error!(label = %event.label, error = %e, "scheduled research cycle failed");
            format!("Scheduled research cycle failed: {e}")
        }
    };

    if let Some(chat) = notify_chat {
        let responder = ChannelResponder::new(channel, chat);
        if let Err(e) = responder.reply(&text).await {
            warn!(error = %e, "failed to deliver scheduled research memo");
        }
    }
}

/// Sends replies back to the chat a message came from.
pub struct ChannelResponder {
    channel: Arc<dyn Channel>,
    target: String,
}

impl ChannelResponder {
    pub fn new(channel: Arc<dyn Channel>, target: impl Into<String>) -> Self {
        Self {
            channel,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Responder for ChannelResponder {
    async fn reply(&self, text: &str) -> Result<()> {
        let message = OutgoingMessage::text(self.channel.id(), self.target.clone(), text);
        self.channel.send(message).await
    }
}

/// Collects replies in memory.
#[derive(Default)]
pub struct BufferedResponder {
    replies: parking_lot::Mutex<Vec<String>>,
}

impl BufferedResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl Responder for BufferedResponder {
    async fn reply(&self, text: &str) -> Result<()> {
        self.replies.lock().push(text.to_string());
        Ok(())
    }
}
