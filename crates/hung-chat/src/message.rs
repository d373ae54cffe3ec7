//! Conversation messages

use chrono::{DateTime, Utc};
use hung_ai::{ChatMessage, Role};
use serde::{Deserialize, Serialize};

/// Unique message identifier: creation time in milliseconds plus a random
/// suffix, so ids sort by creation and never collide within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub(crate) fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{:013}-{}", now.timestamp_millis(), &suffix[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single turn in a conversation.
///
/// Messages are created by [`ConversationManager`](crate::ConversationManager)
/// only. `content` changes while `streaming` is set; every other field is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    streaming: bool,
}

impl Message {
    pub(crate) fn from_new(new: NewMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(now),
            role: new.role,
            content: new.content,
            timestamp: now,
            // Only assistant turns are ever filled incrementally
            streaming: new.streaming && new.role == Role::Assistant,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub(crate) fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub(crate) fn finish_streaming(&mut self) -> bool {
        std::mem::replace(&mut self.streaming, false)
    }

    /// Reduce to the `{role, content}` pair sent as request context
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// The caller-supplied part of a message; id and timestamp are assigned on
/// append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub streaming: bool,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            streaming: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            streaming: false,
        }
    }

    /// Empty assistant message filled in place as chunks arrive
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
        }
    }
}
