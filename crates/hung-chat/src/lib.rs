//! hung-chat: Conversation core for the chat client
//!
//! This crate owns the active conversation and its durable copies. It drives
//! the completion capability (streaming first, single-shot as fallback),
//! paces cosmetic text reveal, and archives conversations into a bounded
//! rolling history.

pub mod autosave;
pub mod error;
pub mod events;
pub mod manager;
pub mod message;
pub mod orchestrator;
pub mod reveal;
pub mod settings;
pub mod storage;
pub mod store;

pub use autosave::{AutoSave, AutoSaveConfig, AutoSaveHandle};
pub use error::{Error, Result};
pub use events::ConversationEvent;
pub use manager::{ConversationManager, InitOutcome};
pub use message::{Message, MessageId, NewMessage};
pub use orchestrator::{CompletionOrchestrator, OrchestratorConfig, SendOutcome};
pub use reveal::{RevealConfig, RevealDriver, RevealFrame, RevealState};
pub use settings::{Settings, SettingsPatch};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{
    ArchivedConversation, ConversationId, CurrentConversation, HISTORY_LIMIT, PersistentStore,
    RecordKind, StoreOutcome,
};

pub use hung_ai::{FailureKind, Role};
