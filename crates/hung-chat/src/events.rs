//! Conversation event types

use serde::{Deserialize, Serialize};

use crate::{
    message::{Message, MessageId},
    settings::Settings,
    store::ConversationId,
};

/// Events emitted by [`ConversationManager`](crate::ConversationManager)
/// after each mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A message was appended
    MessageAdded { message: Message },

    /// The last message's content was replaced (streaming increment)
    LastMessageUpdated { id: MessageId, content: String },

    /// The streaming message was finalized
    StreamingFinished { id: MessageId },

    /// The active conversation was emptied
    Cleared,

    /// An archived conversation became the active one
    ConversationLoaded {
        id: ConversationId,
        message_count: usize,
    },

    /// The active conversation was archived into history
    Archived { id: ConversationId, title: String },

    /// Settings changed
    SettingsChanged { settings: Settings },
}
