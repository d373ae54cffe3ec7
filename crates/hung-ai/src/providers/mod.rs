//! Completion provider implementations

pub mod openai;

use crate::{ChunkStream, CompletionOptions, Context, Error, Result};
use async_trait::async_trait;

pub use openai::OpenAICompatibleProvider;

/// The completion capability consumed by the chat core
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a complete response in one round trip
    async fn complete(&self, context: &Context, options: &CompletionOptions) -> Result<String>;

    /// Request a response as a stream of text fragments
    async fn stream(&self, context: &Context, options: &CompletionOptions) -> Result<ChunkStream>;
}

/// Get an API key from the provided value or the first set environment variable
pub fn get_api_key(provided: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
        .ok_or(Error::InvalidApiKey)
}
