//! Active conversation state and its synchronization to storage

use chrono::Utc;
use hung_ai::ChatMessage;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    events::ConversationEvent,
    message::{Message, NewMessage},
    settings::{Settings, SettingsPatch},
    store::{ArchivedConversation, ConversationId, HISTORY_LIMIT, PersistentStore, StoreOutcome},
};

/// Maximum title length in characters, before the ellipsis
const TITLE_CHARS: usize = 50;

const UNTITLED: &str = "New Conversation";

/// What [`ConversationManager::initialize`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Started empty and cleared the saved conversation
    FreshStart(StoreOutcome),
    /// Restored the saved conversation (possibly empty)
    Restored { message_count: usize },
}

struct State {
    messages: Vec<Message>,
    settings: Settings,
    /// Bumped on every change to `messages`
    revision: u64,
    /// Revision last archived by [`ConversationManager::archive_if_changed`]
    archived_revision: Option<u64>,
}

/// Owner of the active conversation.
///
/// All mutations go through these methods, which keep the streaming
/// invariant (at most one streaming message, always the last and always an
/// assistant turn), save the active conversation after every change, and
/// broadcast a [`ConversationEvent`].
pub struct ConversationManager {
    store: PersistentStore,
    state: Mutex<State>,
    event_tx: broadcast::Sender<ConversationEvent>,
}

impl ConversationManager {
    /// Create a manager over `store`, reading saved settings. The active
    /// conversation starts empty until [`initialize`](Self::initialize).
    pub fn new(store: PersistentStore) -> Self {
        let settings = store.settings();
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            state: Mutex::new(State {
                messages: Vec::new(),
                settings,
                revision: 0,
                archived_revision: None,
            }),
            event_tx,
        }
    }

    /// Subscribe to conversation events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn persist_current(&self, messages: &[Message]) {
        if !messages.is_empty() {
            self.store
                .save_current_conversation(messages)
                .log("current conversation");
        }
    }

    /// Load startup state according to `startNewChatOnReopen`
    pub fn initialize(&self) -> InitOutcome {
        let mut state = self.state.lock();
        state.revision += 1;

        if state.settings.start_new_chat_on_reopen {
            state.messages.clear();
            let outcome = self
                .store
                .clear_current_conversation()
                .log("current conversation");
            tracing::debug!("Starting with a fresh conversation");
            return InitOutcome::FreshStart(outcome);
        }

        let mut messages = self
            .store
            .current_conversation()
            .map(|c| c.messages)
            .unwrap_or_default();
        // A streaming flag cannot survive a restart
        for message in &mut messages {
            message.finish_streaming();
        }
        let message_count = messages.len();
        state.messages = messages;
        tracing::debug!(message_count, "Restored saved conversation");
        InitOutcome::Restored { message_count }
    }

    /// Append a message, assigning its id and timestamp
    pub fn add_message(&self, new: NewMessage) -> Message {
        let mut state = self.state.lock();

        if let Some(last) = state.messages.last_mut() {
            if last.finish_streaming() {
                tracing::debug!(id = %last.id(), "Finalized streaming message superseded by append");
            }
        }

        let message = Message::from_new(new, Utc::now());
        state.messages.push(message.clone());
        state.revision += 1;
        self.persist_current(&state.messages);
        drop(state);

        self.emit(ConversationEvent::MessageAdded {
            message: message.clone(),
        });
        message
    }

    /// Replace the content of the last message. Returns `false` when there
    /// is no message.
    pub fn update_last_message(&self, content: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        let Some(last) = state.messages.last_mut() else {
            return false;
        };

        let content = content.into();
        last.set_content(content.clone());
        let id = last.id().clone();
        state.revision += 1;
        self.persist_current(&state.messages);
        drop(state);

        self.emit(ConversationEvent::LastMessageUpdated { id, content });
        true
    }

    /// Clear the streaming flag of the last message. Returns `false` when
    /// nothing was streaming.
    pub fn finish_streaming(&self) -> bool {
        let mut state = self.state.lock();
        let Some(last) = state.messages.last_mut() else {
            return false;
        };
        if !last.finish_streaming() {
            return false;
        }

        let id = last.id().clone();
        state.revision += 1;
        self.persist_current(&state.messages);
        drop(state);

        self.emit(ConversationEvent::StreamingFinished { id });
        true
    }

    /// Empty the active conversation and remove its saved copy. History is
    /// untouched.
    pub fn clear_messages(&self) -> StoreOutcome {
        let mut state = self.state.lock();
        state.messages.clear();
        state.revision += 1;
        let outcome = self
            .store
            .clear_current_conversation()
            .log("current conversation");
        drop(state);

        self.emit(ConversationEvent::Cleared);
        outcome
    }

    /// Remove every saved record and start over with default settings and
    /// an empty conversation
    pub fn clear_all_data(&self) -> StoreOutcome {
        let mut state = self.state.lock();
        state.messages.clear();
        state.settings = Settings::default();
        state.revision += 1;
        let outcome = self.store.clear_all().log("all records");
        let settings = state.settings.clone();
        drop(state);

        tracing::debug!("Cleared all saved data");
        self.emit(ConversationEvent::Cleared);
        self.emit(ConversationEvent::SettingsChanged { settings });
        outcome
    }

    /// Archive the active conversation at the head of history, keeping the
    /// newest [`HISTORY_LIMIT`] entries. The active conversation is kept.
    pub fn save_to_history(&self) -> StoreOutcome {
        let state = self.state.lock();
        self.archive(&state)
    }

    /// Archive only if the conversation changed since the last call
    pub fn archive_if_changed(&self) -> StoreOutcome {
        let mut state = self.state.lock();
        if state.archived_revision == Some(state.revision) {
            return StoreOutcome::Skipped;
        }

        let outcome = self.archive(&state);
        if !outcome.is_failed() {
            state.archived_revision = Some(state.revision);
        }
        outcome
    }

    fn archive(&self, state: &State) -> StoreOutcome {
        if state.messages.is_empty() {
            return StoreOutcome::Skipped;
        }

        let mut messages = state.messages.clone();
        for message in &mut messages {
            message.finish_streaming();
        }

        let now = Utc::now();
        let conversation = ArchivedConversation {
            id: ConversationId::generate(now),
            title: derive_title(&messages[0]),
            message_count: messages.len(),
            messages,
            created_at: now,
        };
        let id = conversation.id.clone();
        let title = conversation.title.clone();

        let mut history = self.store.history();
        history.insert(0, conversation);
        history.truncate(HISTORY_LIMIT);
        let outcome = self.store.save_history(&history).log("chat history");

        if !outcome.is_failed() {
            tracing::debug!(%id, entries = history.len(), "Archived conversation");
            self.emit(ConversationEvent::Archived { id, title });
        }
        outcome
    }

    /// Make an archived conversation the active one. Returns `false` if no
    /// entry has that id.
    pub fn load_conversation(&self, id: &ConversationId) -> bool {
        let Some(conversation) = self.store.history().into_iter().find(|c| &c.id == id) else {
            tracing::debug!(%id, "No archived conversation with this id");
            return false;
        };

        let mut state = self.state.lock();
        let mut messages = conversation.messages;
        for message in &mut messages {
            message.finish_streaming();
        }
        let message_count = messages.len();
        state.messages = messages;
        state.revision += 1;
        self.persist_current(&state.messages);
        drop(state);

        self.emit(ConversationEvent::ConversationLoaded {
            id: id.clone(),
            message_count,
        });
        true
    }

    /// Archived conversations, newest first
    pub fn chat_history(&self) -> Vec<ArchivedConversation> {
        self.store.history()
    }

    /// Merge a partial update into settings and save them
    pub fn update_settings(&self, patch: &SettingsPatch) -> StoreOutcome {
        let mut state = self.state.lock();
        state.settings = state.settings.merged(patch);
        let settings = state.settings.clone();
        let outcome = self.store.save_settings(&settings).log("settings");
        drop(state);

        self.emit(ConversationEvent::SettingsChanged { settings });
        outcome
    }

    pub fn settings(&self) -> Settings {
        self.state.lock().settings.clone()
    }

    /// Snapshot of the active conversation
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.state.lock().messages.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Mutation counter for the active conversation
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// The last `n` messages, oldest first, reduced to request context
    pub fn recent_history(&self, n: usize) -> Vec<ChatMessage> {
        let state = self.state.lock();
        let start = state.messages.len().saturating_sub(n);
        state.messages[start..]
            .iter()
            .map(Message::to_chat_message)
            .collect()
    }
}

fn derive_title(first: &Message) -> String {
    let content = first.content();
    if content.is_empty() {
        return UNTITLED.to_string();
    }
    let truncated: String = content.chars().take(TITLE_CHARS).collect();
    format!("{}...", truncated)
}
