use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as TokioMutex, RwLock};
use tracing::debug;

use scout_core::{ConversationKey, Role, Turn};

#[derive(Debug, Default)]
struct Conversation {
    turns: Vec<Turn>,
    /// Bumped on every reset. Writes carrying an older epoch are dropped.
    epoch: u64,
}

/// Per-key conversation history, created lazily on first use.
///
/// A conversation is cleared on reset but never removed, so its run lock and
/// epoch survive for the life of the process.
#[derive(Clone)]
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationKey, Conversation>>>,
    /// Per-key run locks. The agent loop holds one for a whole run, so a
    /// second message for the same key waits for the first to finish.
    run_locks: Arc<RwLock<HashMap<ConversationKey, Arc<TokioMutex<()>>>>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            run_locks: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
        }
    }

    /// Current turns for `key`; empty if the key has never been used.
    pub async fn history(&self, key: &str) -> Vec<Turn> {
        self.conversations
            .read()
            .await
            .get(key)
            .map(|c| c.turns.clone())
            .unwrap_or_default()
    }

    /// Turns plus the epoch a writer must present to append to them.
    pub async fn snapshot(&self, key: &str) -> (Vec<Turn>, u64) {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(key.to_string()).or_default();
        (conversation.turns.clone(), conversation.epoch)
    }

    pub async fn epoch(&self, key: &str) -> u64 {
        self.conversations.read().await.get(key).map(|c| c.epoch).unwrap_or(0)
    }

    /// Append turns written under `epoch`. Returns `false` (and stores
    /// nothing) when the conversation was reset since that epoch.
    pub async fn append(&self, key: &str, epoch: u64, turns: impl IntoIterator<Item = Turn>) -> bool {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(key.to_string()).or_default();
        if conversation.epoch != epoch {
            debug!(conversation = %key, "discarding write from before reset");
            return false;
        }
        conversation.turns.extend(turns);
        trim_to_window(&mut conversation.turns, self.max_turns);
        true
    }

    /// Clear a conversation's turns. Idempotent.
    pub async fn reset(&self, key: &str) {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations.entry(key.to_string()).or_default();
        conversation.turns.clear();
        conversation.epoch += 1;
        debug!(conversation = %key, epoch = conversation.epoch, "conversation reset");
    }

    pub async fn len(&self, key: &str) -> usize {
        self.conversations.read().await.get(key).map(|c| c.turns.len()).unwrap_or(0)
    }

    pub async fn keys(&self) -> Vec<ConversationKey> {
        self.conversations.read().await.keys().cloned().collect()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Get the per-key run lock. Callers should hold the guard for the
    /// duration of their agent loop to prevent concurrent runs on the same key.
    pub async fn run_lock(&self, key: &str) -> Arc<TokioMutex<()>> {
        // Fast path: lock already exists
        {
            let locks = self.run_locks.read().await;
            if let Some(lock) = locks.get(key) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.run_locks.write().await;
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(()))),
        )
    }
}

/// Drop turns from the front until at most `max` remain, cutting at a `user`
/// turn so no `tool` turn outlives the assistant turn that requested it.
pub fn trim_to_window(turns: &mut Vec<Turn>, max: usize) {
    if max == 0 || turns.len() <= max {
        return;
    }
    let excess = turns.len() - max;
    match turns[excess..].iter().position(|t| t.role == Role::User) {
        Some(offset) => {
            turns.drain(..excess + offset);
        }
        None => {
            // One run longer than the window: keep its tail, minus orphaned results.
            turns.drain(..excess);
            let orphans = turns.iter().take_while(|t| t.role == Role::Tool).count();
            turns.drain(..orphans);
        }
    }
}
