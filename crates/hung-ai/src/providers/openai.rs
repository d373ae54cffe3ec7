//! OpenAI-compatible Chat Completions provider (OpenRouter, OpenAI, local servers)

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::{CompletionProvider, get_api_key},
    stream::ChunkStream,
    types::{ChatMessage, CompletionOptions, Context, DEFAULT_BASE_URL},
};

/// Environment variables checked for an API key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["HUNG_API_KEY", "OPENROUTER_API_KEY"];

/// Text returned when the endpoint answers without any content
const EMPTY_RESPONSE_TEXT: &str =
    "I apologize, but I was unable to generate a response. Please try again.";

/// Client for any endpoint speaking the `/chat/completions` protocol
pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    /// Create a provider for a base URL.
    ///
    /// A missing key is not an error here; requests fail with
    /// [`Error::InvalidApiKey`] instead.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// Create an OpenRouter provider with an explicit key
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(DEFAULT_BASE_URL, Some(api_key.into()))
    }

    /// Create an OpenRouter provider, reading the key from the environment
    pub fn from_env() -> Self {
        Self::new(DEFAULT_BASE_URL, get_api_key(None, API_KEY_ENV_VARS).ok())
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let api_key = self.api_key.as_deref().ok_or(Error::InvalidApiKey)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse()
                .map_err(|_| Error::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert(
            CONTENT_TYPE,
            "application/json"
                .parse()
                .map_err(|_| Error::InvalidConfig("content-type header".into()))?,
        );
        Ok(headers)
    }
}

fn build_request(context: &Context, options: &CompletionOptions, stream: bool) -> CompletionRequest {
    CompletionRequest {
        model: options.model.clone(),
        messages: context.to_messages(),
        stream,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        frequency_penalty: options.frequency_penalty,
        presence_penalty: options.presence_penalty,
    }
}

/// Map a non-success HTTP status and its body to a typed error
fn status_error(status: reqwest::StatusCode, retry_after: Option<u64>, body: String) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Auth(body),
        429 => Error::RateLimited { retry_after },
        code => Error::status(code, body),
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl CompletionProvider for OpenAICompatibleProvider {
    async fn complete(&self, context: &Context, options: &CompletionOptions) -> Result<String> {
        let headers = self.headers()?;
        let request = build_request(context, options, false);

        tracing::debug!(model = %options.model, messages = request.messages.len(), "completion request");

        let response = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, body));
        }

        let body: CompletionResponse = response.json().await?;
        Ok(extract_content(body))
    }

    async fn stream(&self, context: &Context, options: &CompletionOptions) -> Result<ChunkStream> {
        let headers = self.headers()?;
        let request = build_request(context, options, true);

        tracing::debug!(model = %options.model, messages = request.messages.len(), "streaming request");

        let request_builder = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn extract_content(response: CompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| EMPTY_RESPONSE_TEXT.to_string())
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<String>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            if let Some(error) = chunk.error {
                                yield Err(Error::api_error(error));
                                break;
                            }
                            let delta = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                                .unwrap_or_default();
                            if !delta.is_empty() {
                                yield Ok(delta);
                            }
                        }
                        Err(e) => {
                            yield Err(Error::Sse(format!("Failed to parse chunk: {}", e)));
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let retry_after = retry_after_secs(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    yield Err(status_error(status, retry_after, body));
                    break;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    yield Err(Error::Http(e));
                    break;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
        event_source.close();
    }
}

impl Error {
    /// Error object embedded in a streamed chunk (OpenRouter reports
    /// mid-stream failures this way)
    fn api_error(error: StreamError) -> Self {
        match error.code {
            Some(code) => status_error(
                reqwest::StatusCode::from_u16(code).unwrap_or(reqwest::StatusCode::BAD_GATEWAY),
                None,
                error.message,
            ),
            None => Error::Sse(error.message),
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}
