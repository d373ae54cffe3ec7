//! Durable records: rolling history, active conversation, settings
//!
//! Every record is encoded to JSON and written wholesale. Reads that fail or
//! do not parse are treated as absent; writes report a [`StoreOutcome`]
//! instead of an error, because the in-memory state stays authoritative for
//! the running session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{message::Message, settings::Settings, storage::KeyValueStorage};

/// Maximum number of archived conversations kept in history
pub const HISTORY_LIMIT: usize = 50;

/// The three logical records kept in storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    History,
    CurrentConversation,
    Settings,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::History,
        RecordKind::CurrentConversation,
        RecordKind::Settings,
    ];

    /// Storage key for this record
    pub fn key(&self) -> &'static str {
        match self {
            RecordKind::History => "hung_ai_chat_history",
            RecordKind::CurrentConversation => "hung_ai_current_conversation",
            RecordKind::Settings => "hung_ai_chat_settings",
        }
    }
}

/// Result of a persistence side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    Removed,
    /// Nothing needed writing
    Skipped,
    Failed(String),
}

impl StoreOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StoreOutcome::Failed(_))
    }

    /// Log a failure against `what` and pass the outcome through
    pub fn log(self, what: &str) -> Self {
        match &self {
            StoreOutcome::Failed(reason) => {
                tracing::warn!("Failed to persist {}: {}", what, reason);
            }
            outcome => tracing::trace!(?outcome, "persisted {}", what),
        }
        self
    }
}

/// Identifier assigned to a conversation when it is archived
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub(crate) fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", now.timestamp_millis(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedConversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

impl ArchivedConversation {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        self.created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

/// The saved copy of the active conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConversation {
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
    pub id: i64,
}

/// Typed access to the three records over any [`KeyValueStorage`]
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStorage>,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KeyValueStorage>) -> Self {
        Self { backend }
    }

    /// Read and decode a record; any failure reads as absent
    pub fn get<T: DeserializeOwned>(&self, kind: RecordKind) -> Option<T> {
        let raw = match self.backend.get(kind.key()) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Error reading {} from storage: {}", kind.key(), e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding unreadable {} record: {}", kind.key(), e);
                None
            }
        }
    }

    /// Encode and write a record wholesale
    pub fn set<T: Serialize>(&self, kind: RecordKind, value: &T) -> StoreOutcome {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => return StoreOutcome::Failed(e.to_string()),
        };

        match self.backend.set(kind.key(), &encoded) {
            Ok(()) => StoreOutcome::Written,
            Err(e) => StoreOutcome::Failed(e.to_string()),
        }
    }

    pub fn remove(&self, kind: RecordKind) -> StoreOutcome {
        match self.backend.remove(kind.key()) {
            Ok(()) => StoreOutcome::Removed,
            Err(e) => StoreOutcome::Failed(e.to_string()),
        }
    }

    /// Archived conversations, newest first
    pub fn history(&self) -> Vec<ArchivedConversation> {
        self.get(RecordKind::History).unwrap_or_default()
    }

    pub fn save_history(&self, history: &[ArchivedConversation]) -> StoreOutcome {
        self.set(RecordKind::History, &history)
    }

    pub fn current_conversation(&self) -> Option<CurrentConversation> {
        self.get(RecordKind::CurrentConversation)
    }

    pub fn save_current_conversation(&self, messages: &[Message]) -> StoreOutcome {
        let now = Utc::now();
        let record = CurrentConversation {
            messages: messages.to_vec(),
            last_updated: now,
            id: now.timestamp_millis(),
        };
        self.set(RecordKind::CurrentConversation, &record)
    }

    pub fn clear_current_conversation(&self) -> StoreOutcome {
        self.remove(RecordKind::CurrentConversation)
    }

    /// Stored settings; absent keys take their defaults
    pub fn settings(&self) -> Settings {
        self.get(RecordKind::Settings).unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &Settings) -> StoreOutcome {
        self.set(RecordKind::Settings, settings)
    }

    /// Remove every record. Stops at the first failure.
    pub fn clear_all(&self) -> StoreOutcome {
        for kind in RecordKind::ALL {
            let outcome = self.remove(kind);
            if outcome.is_failed() {
                return outcome;
            }
        }
        StoreOutcome::Removed
    }

    /// Total size of the encoded records in bytes
    pub fn usage_bytes(&self) -> usize {
        RecordKind::ALL
            .iter()
            .filter_map(|kind| match self.backend.get(kind.key()) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Error calculating storage usage: {}", e);
                    None
                }
            })
            .map(|value| value.len())
            .sum()
    }

    /// Total size rounded to the nearest kilobyte
    pub fn usage_kb(&self) -> usize {
        (self.usage_bytes() + 512) / 1024
    }
}
