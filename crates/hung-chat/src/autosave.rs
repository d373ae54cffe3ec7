//! Periodic background archiving of the active conversation

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::{manager::ConversationManager, store::StoreOutcome};

/// Auto-save configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveConfig {
    /// Time between archive attempts
    pub interval: Duration,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Background task that archives the conversation while it keeps changing
pub struct AutoSave;

impl AutoSave {
    /// Start archiving every `config.interval`. The first tick fires one
    /// interval after the call, not immediately.
    pub fn spawn(manager: Arc<ConversationManager>, config: AutoSaveConfig) -> AutoSaveHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_manager = Arc::clone(&manager);

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + config.interval;
            let mut ticker = interval_at(start, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        task_manager.archive_if_changed().log("auto-saved conversation");
                    }
                }
            }
            tracing::debug!("Auto-save stopped");
        });

        AutoSaveHandle {
            cancel,
            task: Some(task),
            manager,
        }
    }
}

/// Owner of a running auto-save task
pub struct AutoSaveHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    manager: Arc<ConversationManager>,
}

impl AutoSaveHandle {
    /// Stop the timer without a final save
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the timer, wait for it, then archive one last time if anything
    /// changed since the previous archive
    pub async fn shutdown(mut self) -> StoreOutcome {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Auto-save task ended abnormally: {}", e);
            }
        }
        self.manager.archive_if_changed().log("conversation on shutdown")
    }
}

impl Drop for AutoSaveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::NewMessage;
    use crate::storage::MemoryStorage;
    use crate::store::PersistentStore;

    fn manager() -> Arc<ConversationManager> {
        let store = PersistentStore::new(Arc::new(MemoryStorage::new()));
        Arc::new(ConversationManager::new(store))
    }

    #[tokio::test(start_paused = true)]
    async fn test_archives_on_interval_only_when_changed() {
        let manager = manager();
        manager.add_message(NewMessage::user("hello"));

        let handle = AutoSave::spawn(Arc::clone(&manager), AutoSaveConfig::default());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(manager.chat_history().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(manager.chat_history().len(), 1);

        // Unchanged conversation is not archived again
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(manager.chat_history().len(), 1);

        manager.add_message(NewMessage::assistant("hi"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        let history = manager.chat_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_count, 2);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_conversation_never_archived() {
        let manager = manager();
        let handle = AutoSave::spawn(Arc::clone(&manager), AutoSaveConfig::default());
        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(manager.chat_history().is_empty());
        assert_eq!(handle.shutdown().await, StoreOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_pending_changes() {
        let manager = manager();
        let handle = AutoSave::spawn(Arc::clone(&manager), AutoSaveConfig::default());

        manager.add_message(NewMessage::user("before exit"));
        assert_eq!(handle.shutdown().await, StoreOutcome::Written);

        let history = manager.chat_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "before exit...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let manager = manager();
        manager.add_message(NewMessage::user("hello"));
        let handle = AutoSave::spawn(
            Arc::clone(&manager),
            AutoSaveConfig {
                interval: Duration::from_secs(5),
            },
        );
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(manager.chat_history().is_empty());
    }
}
