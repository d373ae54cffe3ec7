//! Error types for hung-ai

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Result type alias using hung-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a completion endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Missing API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The failure classes surfaced to users.
///
/// Raw transport errors never reach the display layer; they are reduced to
/// one of these and rendered with [`FailureKind::user_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Authentication,
    RateLimited,
    Unavailable,
    Network,
    Other,
}

impl FailureKind {
    /// Fixed human-readable text for this failure class
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::Authentication => "Authentication failed. Please check your API key.",
            FailureKind::RateLimited => "Rate limit exceeded. Please wait a moment and try again.",
            FailureKind::Unavailable => {
                "The AI service is temporarily unavailable. Please try again later."
            }
            FailureKind::Network => "Network error. Please check your connection and try again.",
            FailureKind::Other => "Unable to connect to AI service. Please try again in a moment.",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}

/// Patterns that identify connectivity failures in error text, for errors
/// that only carry a message (SSE parser errors, wrapped transport errors).
static NETWORK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)network",
        r"(?i)\bfetch\b",
        r"(?i)connection.?(refused|reset|closed|aborted)",
        r"(?i)error trying to connect",
        r"(?i)dns",
        r"(?i)timed?.?out",
        r"(?i)unreachable",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Check if an error message describes a connectivity failure
pub fn is_network_message(message: &str) -> bool {
    NETWORK_PATTERNS.iter().any(|re| re.is_match(message))
}

impl Error {
    /// Create a status error from code and body
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a user-facing failure class
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Auth(_) | Error::InvalidApiKey => FailureKind::Authentication,
            Error::RateLimited { .. } => FailureKind::RateLimited,
            Error::Status { status, .. } => match status {
                401 | 403 => FailureKind::Authentication,
                429 => FailureKind::RateLimited,
                500..=599 => FailureKind::Unavailable,
                _ => FailureKind::Other,
            },
            Error::Http(e) => {
                if e.is_connect() || e.is_timeout() || e.is_request() {
                    FailureKind::Network
                } else if let Some(status) = e.status() {
                    Error::status(status.as_u16(), e.to_string()).failure_kind()
                } else if is_network_message(&e.to_string()) {
                    FailureKind::Network
                } else {
                    FailureKind::Other
                }
            }
            Error::Sse(message) | Error::UnexpectedResponse(message) => {
                if is_network_message(message) {
                    FailureKind::Network
                } else {
                    FailureKind::Other
                }
            }
            Error::Json(_) | Error::InvalidConfig(_) => FailureKind::Other,
        }
    }
}
