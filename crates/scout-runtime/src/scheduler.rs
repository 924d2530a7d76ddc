//! # Research Scheduler
//!
//! Fires recurring cron jobs (e.g. `"0 0 7 * * *"` for 07:00 daily) as
//! [`SchedulerEvent`]s. The runtime answers each event by running a
//! headless research cycle and, if configured, posting the memo to a chat.

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scout_config::ScoutConfig;

/// What a scheduled task does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduledJob {
    /// Run a research cycle; send the memo to `notify_chat` if set.
    ResearchCycle { notify_chat: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    /// Human-readable label; tasks are deduplicated by it.
    pub label: String,
    pub expression: String,
    pub job: ScheduledJob,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub fire_count: u64,
    pub last_fired: Option<DateTime<Utc>>,
}

/// Emitted when a task is due.
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    pub task_id: Uuid,
    pub label: String,
    pub job: ScheduledJob,
}

pub struct CronScheduler {
    tasks: Arc<TokioMutex<HashMap<Uuid, ScheduledTask>>>,
    event_tx: mpsc::Sender<SchedulerEvent>,
}

impl CronScheduler {
    /// Create a new scheduler. Returns the scheduler and a receiver for scheduler events.
    pub fn new() -> (Self, mpsc::Receiver<SchedulerEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let scheduler = Self {
            tasks: Arc::new(TokioMutex::new(HashMap::new())),
            event_tx,
        };
        (scheduler, event_rx)
    }

    /// Add a recurring task. An active task with the same label is kept
    /// and its id returned.
    pub async fn add_cron(&self, label: &str, cron_expr: &str, job: ScheduledJob) -> Result<Uuid, String> {
        Schedule::from_str(cron_expr).map_err(|e| format!("Invalid cron expression '{cron_expr}': {e}"))?;

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.values().find(|t| t.active && t.label == label) {
            info!(task_id = %existing.id, label = %label, "scheduled task already exists, skipping");
            return Ok(existing.id);
        }

        let task = ScheduledTask {
            id: Uuid::new_v4(),
            label: label.to_string(),
            expression: cron_expr.to_string(),
            job,
            created_at: Utc::now(),
            active: true,
            fire_count: 0,
            last_fired: None,
        };
        let id = task.id;
        tasks.insert(id, task);
        info!(task_id = %id, cron = cron_expr, label = %label, "scheduled recurring task");
        Ok(id)
    }

    pub async fn remove(&self, task_id: Uuid) -> bool {
        self.tasks.lock().await.remove(&task_id).is_some()
    }

    pub async fn list(&self) -> Vec<ScheduledTask> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect()
    }

    /// Register the research cycle from `[research].schedule`, if set.
    pub async fn load_from_config(&self, config: &ScoutConfig) {
        let Some(ref cron_expr) = config.research.schedule else {
            return;
        };
        let job = ScheduledJob::ResearchCycle {
            notify_chat: config.research.notify_chat.clone(),
        };
        match self.add_cron("research", cron_expr, job).await {
            Ok(id) => info!(task_id = %id, cron = %cron_expr, "loaded research schedule from config"),
            Err(e) => warn!(error = %e, "failed to load research schedule from config"),
        }
    }

    /// Mark every task due at `now` as fired and return its event.
    pub async fn due_events(&self, now: DateTime<Utc>) -> Vec<SchedulerEvent> {
        let mut tasks = self.tasks.lock().await;
        let mut events = Vec::new();

        for task in tasks.values_mut().filter(|t| t.active) {
            let schedule = match Schedule::from_str(&task.expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "invalid cron expression, deactivating");
                    task.active = false;
                    continue;
                }
            };
            // Fire if a scheduled time falls between the last firing (or creation) and now.
            let since = task.last_fired.unwrap_or(task.created_at);
            let due = schedule.after(&since).next().is_some_and(|next| next <= now);
            if !due {
                continue;
            }

            task.fire_count += 1;
            task.last_fired = Some(now);
            debug!(task_id = %task.id, label = %task.label, fire_count = task.fire_count, "scheduler firing task");
            events.push(SchedulerEvent {
                task_id: task.id,
                label: task.label.clone(),
                job: task.job.clone(),
            });
        }
        events
    }

    /// Run the scheduler loop. This should be spawned as a background task.
    /// Checks for due tasks every 10 seconds.
    pub async fn run(self) {
        let check_interval = tokio::time::Duration::from_secs(10);
        info!("scheduler started, checking every 10s");

        loop {
            tokio::time::sleep(check_interval).await;
            for event in self.due_events(Utc::now()).await {
                if self.event_tx.send(event).await.is_err() {
                    warn!("scheduler event channel closed, shutting down");
                    return;
                }
            }
        }
    }
}
