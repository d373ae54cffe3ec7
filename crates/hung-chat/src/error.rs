//! Error types for hung-chat

use hung_ai::FailureKind;
use thiserror::Error;

/// Result type alias using hung-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the conversation core
#[derive(Error, Debug)]
pub enum Error {
    /// Both the streaming and the single-shot request failed.
    ///
    /// Displays only the fixed user-facing text for `kind`; the transport
    /// error stays reachable through `source()` for logging.
    #[error("{kind}")]
    Completion {
        kind: FailureKind,
        #[source]
        source: hung_ai::Error,
    },

    /// A storage backend rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings key that does not exist
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// Settings value that cannot be parsed for its key
    #[error("Invalid value for {key}: {value}")]
    InvalidSettingValue { key: String, value: String },
}

impl Error {
    /// Wrap a provider error, classifying it for display
    pub fn completion(source: hung_ai::Error) -> Self {
        Self::Completion {
            kind: source.failure_kind(),
            source,
        }
    }

    /// Failure class, if this error came from the completion capability
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::Completion { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
