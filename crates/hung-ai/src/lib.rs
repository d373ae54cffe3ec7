//! hung-ai: Chat completion client
//!
//! This crate provides the completion capability used by the chat core: wire
//! types, a provider trait with single-shot and streaming calls, and an
//! OpenAI-compatible HTTP provider (OpenRouter by default).

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, FailureKind, Result};
pub use providers::CompletionProvider;
pub use stream::ChunkStream;
pub use types::*;
