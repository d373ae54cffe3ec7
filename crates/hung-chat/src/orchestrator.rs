//! Turning a user message into an assistant reply
//!
//! A send appends the user message and an empty streaming placeholder, then
//! fills the placeholder chunk by chunk. If the stream fails at any point the
//! placeholder is finalized as-is and one single-shot request is made; its
//! reply is appended as a separate message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use hung_ai::{ChatMessage, CompletionOptions, CompletionProvider, Context};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    manager::ConversationManager,
    message::NewMessage,
};

/// Persona instruction sent ahead of every request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are HUNG AI, an intelligent and helpful AI assistant \
created by Lord UTK the Packer. You are knowledgeable, engaging, and provide detailed, accurate \
responses. You support markdown formatting and code syntax highlighting. Always be helpful, \
professional, and aim to provide comprehensive answers to user queries.";

/// Number of prior messages sent as context
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    /// How many prior messages accompany each request
    pub history_window: usize,
    pub options: CompletionOptions,
    /// Try the streaming channel first; when off, go straight to single-shot
    pub stream: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            options: CompletionOptions::default(),
            stream: true,
        }
    }
}

/// How a send finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty input or another send in flight; nothing happened
    Ignored,
    /// The streamed reply, now held in the finalized placeholder
    Streamed(String),
    /// The single-shot reply, appended as its own message
    Fallback(String),
}

impl SendOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            SendOutcome::Ignored => None,
            SendOutcome::Streamed(reply) | SendOutcome::Fallback(reply) => Some(reply),
        }
    }
}

/// Clears a flag when dropped, so early returns and cancelled futures
/// cannot leave it set
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the completion capability on behalf of the conversation
pub struct CompletionOrchestrator {
    manager: Arc<ConversationManager>,
    provider: Arc<dyn CompletionProvider>,
    config: OrchestratorConfig,
    loading: AtomicBool,
    streaming: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl CompletionOrchestrator {
    pub fn new(
        manager: Arc<ConversationManager>,
        provider: Arc<dyn CompletionProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            manager,
            provider,
            config,
            loading: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<ConversationManager> {
        &self.manager
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A send is in flight
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Chunks are currently being received
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Input should be disabled
    pub fn is_busy(&self) -> bool {
        self.is_loading() || self.is_streaming()
    }

    /// User-facing text of the last failed send, cleared when a new send
    /// starts
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Send a user message and obtain the assistant reply.
    ///
    /// Empty input and re-entrant calls return [`SendOutcome::Ignored`]
    /// without side effects. When both the stream and the fallback fail the
    /// error carries only the classified user-facing text.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Send ignored: another request is in flight");
            return Ok(SendOutcome::Ignored);
        }
        let _loading = FlagGuard(&self.loading);
        *self.last_error.lock() = None;

        // Context is the conversation before this message
        let history = self.manager.recent_history(self.config.history_window);
        self.manager.add_message(NewMessage::user(text));
        let context = self.build_context(history, text);

        if self.config.stream {
            match self.stream_reply(&context).await {
                Ok(reply) => return Ok(SendOutcome::Streamed(reply)),
                Err(e) => {
                    tracing::warn!("Streaming failed, falling back to regular API: {}", e);
                }
            }
        }

        match self.provider.complete(&context, &self.config.options).await {
            Ok(reply) => {
                self.manager.add_message(NewMessage::assistant(reply.clone()));
                Ok(SendOutcome::Fallback(reply))
            }
            Err(e) => {
                tracing::error!("Completion request failed: {}", e);
                let error = Error::completion(e);
                *self.last_error.lock() = Some(error.to_string());
                Err(error)
            }
        }
    }

    fn build_context(&self, history: Vec<ChatMessage>, text: &str) -> Context {
        let mut context = Context::with_system(self.config.system_prompt.clone());
        for message in history {
            context.push(message);
        }
        context.push(ChatMessage::user(text));
        context
    }

    /// Fill a placeholder from the stream. On failure the placeholder keeps
    /// its partial content and stops streaming.
    async fn stream_reply(&self, context: &Context) -> hung_ai::Result<String> {
        self.streaming.store(true, Ordering::Release);
        let _streaming = FlagGuard(&self.streaming);

        let placeholder = self.manager.add_message(NewMessage::placeholder());
        tracing::debug!(id = %placeholder.id(), "Streaming into placeholder");

        let mut buffer = String::new();
        let result = async {
            let mut stream = self.provider.stream(context, &self.config.options).await?;
            while let Some(chunk) = stream.next().await {
                buffer.push_str(&chunk?);
                self.manager.update_last_message(buffer.clone());
            }
            Ok::<(), hung_ai::Error>(())
        }
        .await;

        self.streaming.store(false, Ordering::Release);
        match result {
            Ok(()) => {
                self.manager.update_last_message(buffer.clone());
                self.manager.finish_streaming();
                Ok(buffer)
            }
            Err(e) => {
                self.manager.finish_streaming();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use hung_ai::{ChunkStream, FailureKind, Role, stream::from_chunks};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::store::PersistentStore;

    /// What the scripted provider does for a stream call
    pub(crate) enum StreamScript {
        Chunks(Vec<&'static str>),
        /// Yield these chunks, then fail
        FailAfter(Vec<&'static str>, hung_ai::Error),
        FailToOpen(hung_ai::Error),
    }

    /// Provider answering from scripted responses, recording every request
    pub(crate) struct ScriptedProvider {
        streams: Mutex<VecDeque<StreamScript>>,
        completions: Mutex<VecDeque<hung_ai::Result<String>>>,
        pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(
            streams: Vec<StreamScript>,
            completions: Vec<hung_ai::Result<String>>,
        ) -> Self {
            Self {
                streams: Mutex::new(streams.into()),
                completions: Mutex::new(completions.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            context: &Context,
            _options: &CompletionOptions,
        ) -> hung_ai::Result<String> {
            self.requests.lock().push(context.to_messages());
            self.completions
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(hung_ai::Error::Sse("no scripted completion".into())))
        }

        async fn stream(
            &self,
            context: &Context,
            _options: &CompletionOptions,
        ) -> hung_ai::Result<ChunkStream> {
            self.requests.lock().push(context.to_messages());
            let script = self
                .streams
                .lock()
                .pop_front()
                .unwrap_or(StreamScript::FailToOpen(hung_ai::Error::Sse("no script".into())));
            match script {
                StreamScript::Chunks(chunks) => Ok(from_chunks(
                    chunks.into_iter().map(|c| Ok(c.to_string())).collect::<Vec<_>>(),
                )),
                StreamScript::FailAfter(chunks, error) => {
                    let mut items: Vec<hung_ai::Result<String>> =
                        chunks.into_iter().map(|c| Ok(c.to_string())).collect();
                    items.push(Err(error));
                    Ok(from_chunks(items))
                }
                StreamScript::FailToOpen(error) => Err(error),
            }
        }
    }

    fn setup(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, CompletionOrchestrator) {
        let manager = Arc::new(ConversationManager::new(PersistentStore::new(Arc::new(
            MemoryStorage::new(),
        ))));
        let provider = Arc::new(provider);
        let orchestrator =
            CompletionOrchestrator::new(manager, provider.clone(), OrchestratorConfig::default());
        (provider, orchestrator)
    }

    #[tokio::test]
    async fn test_streamed_reply_fills_placeholder() {
        let (_, orch) = setup(ScriptedProvider::new(
            vec![StreamScript::Chunks(vec!["Hi", " there", "!"])],
            vec![],
        ));
        let mut events = orch.manager().subscribe();

        let outcome = orch.send("Hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Streamed("Hi there!".into()));

        let messages = orch.manager().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_user());
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].content(), "Hi there!");
        assert!(!messages[1].is_streaming());
        assert!(!orch.is_busy());

        // Increments are observable in order
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let crate::ConversationEvent::LastMessageUpdated { content, .. } = event {
                seen.push(content);
            }
        }
        assert_eq!(seen.first().map(String::as_str), Some("Hi"));
        assert_eq!(seen.last().map(String::as_str), Some("Hi there!"));
    }

    #[tokio::test]
    async fn test_stream_fails_immediately_falls_back() {
        let (_, orch) = setup(ScriptedProvider::new(
            vec![StreamScript::FailToOpen(hung_ai::Error::status(502, "bad gateway"))],
            vec![Ok("Fallback reply".to_string())],
        ));

        let outcome = orch.send("Hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Fallback("Fallback reply".into()));

        let messages = orch.manager().messages();
        // user, abandoned placeholder, fallback reply
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content(), "");
        assert!(!messages[1].is_streaming());
        assert_eq!(messages[2].content(), "Fallback reply");
        assert!(!messages[2].is_streaming());
        assert_eq!(orch.last_error(), None);
    }

    #[tokio::test]
    async fn test_both_channels_fail() {
        let (_, orch) = setup(ScriptedProvider::new(
            vec![StreamScript::FailToOpen(hung_ai::Error::RateLimited { retry_after: None })],
            vec![Err(hung_ai::Error::RateLimited { retry_after: None })],
        ));

        let err = orch.send("Hello").await.unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::RateLimited));
        assert_eq!(err.to_string(), FailureKind::RateLimited.user_message());

        // Exactly the user message and the empty, finalized placeholder
        let messages = orch.manager().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content(), "Hello");
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].content(), "");
        assert!(!messages[1].is_streaming());
        assert!(!orch.is_busy());
    }

    #[tokio::test]
    async fn test_empty_input_ignored() {
        let (provider, orch) = setup(ScriptedProvider::new(vec![], vec![]));
        assert_eq!(orch.send("   \n").await.unwrap(), SendOutcome::Ignored);
        assert!(orch.manager().is_empty());
        assert!(provider.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_partial_stream_failure_leaves_partial_placeholder() {
        let (_, orch) = setup(ScriptedProvider::new(
            vec![StreamScript::FailAfter(
                vec!["Hel"],
                hung_ai::Error::Sse("connection reset".into()),
            )],
            vec![Ok("Hello!".to_string())],
        ));

        let outcome = orch.send("hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::Fallback("Hello!".to_string()));

        let messages = orch.manager().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content(), "Hel");
        assert!(!messages[1].is_streaming());
        assert_eq!(messages[2].content(), "Hello!");
        assert!(!orch.is_busy());
    }

    #[test]
    fn test_default_persona_text() {
        assert_eq!(
            DEFAULT_SYSTEM_PROMPT,
            "You are HUNG AI, an intelligent and helpful AI assistant created by Lord UTK the \
             Packer. You are knowledgeable, engaging, and provide detailed, accurate responses. \
             You support markdown formatting and code syntax highlighting. Always be helpful, \
             professional, and aim to provide comprehensive answers to user queries."
        );
    }

    #[tokio::test]
    async fn test_request_context_shape() {
        let (provider, orch) = setup(ScriptedProvider::new(
            vec![StreamScript::Chunks(vec!["one"]), StreamScript::Chunks(vec!["two"])],
            vec![],
        ));
        orch.send("first").await.unwrap();
        orch.send("second").await.unwrap();

        let requests = provider.requests.lock();
        let second = &requests[1];
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(second[1], ChatMessage::user("first"));
        assert_eq!(second[2], ChatMessage::assistant("one"));
        assert_eq!(second[3], ChatMessage::user("second"));
        assert_eq!(second.len(), 4);
    }

    #[tokio::test]
    async fn test_history_window_limits_context() {
        let chunks: Vec<StreamScript> = (0..8).map(|_| StreamScript::Chunks(vec!["ok"])).collect();
        let (provider, orch) = setup(ScriptedProvider::new(chunks, vec![]));
        for i in 0..8 {
            orch.send(&format!("q{}", i)).await.unwrap();
        }
        let requests = provider.requests.lock();
        let last = requests.last().unwrap();
        // system + 10 history + new user message
        assert_eq!(last.len(), 12);
        assert_eq!(last[1], ChatMessage::user("q2"));
    }

    #[tokio::test]
    async fn test_streaming_disabled_goes_single_shot() {
        let manager = Arc::new(ConversationManager::new(PersistentStore::new(Arc::new(
            MemoryStorage::new(),
        ))));
        let provider = Arc::new(ScriptedProvider::new(vec![], vec![Ok("direct".into())]));
        let orch = CompletionOrchestrator::new(
            manager,
            provider,
            OrchestratorConfig {
                stream: false,
                ..Default::default()
            },
        );

        assert_eq!(
            orch.send("hi").await.unwrap(),
            SendOutcome::Fallback("direct".into())
        );
        let messages = orch.manager().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content(), "direct");
    }

    #[tokio::test]
    async fn test_error_recorded_and_cleared() {
        let (_, orch) = setup(ScriptedProvider::new(
            vec![
                StreamScript::FailToOpen(hung_ai::Error::InvalidApiKey),
                StreamScript::Chunks(vec!["fine"]),
            ],
            vec![Err(hung_ai::Error::InvalidApiKey)],
        ));

        let err = orch.send("hi").await.unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Authentication));
        assert_eq!(
            orch.last_error().as_deref(),
            Some(FailureKind::Authentication.user_message())
        );

        orch.send("again").await.unwrap();
        assert_eq!(orch.last_error(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_send_ignored() {
        use tokio::sync::Notify;

        /// Stream that waits until released
        struct GatedProvider {
            release: Arc<Notify>,
        }

        #[async_trait]
        impl CompletionProvider for GatedProvider {
            async fn complete(
                &self,
                _context: &Context,
                _options: &CompletionOptions,
            ) -> hung_ai::Result<String> {
                Ok("unused".into())
            }

            async fn stream(
                &self,
                _context: &Context,
                _options: &CompletionOptions,
            ) -> hung_ai::Result<ChunkStream> {
                self.release.notified().await;
                Ok(from_chunks(vec![Ok("done".to_string())]))
            }
        }

        let release = Arc::new(Notify::new());
        let manager = Arc::new(ConversationManager::new(PersistentStore::new(Arc::new(
            MemoryStorage::new(),
        ))));
        let orch = Arc::new(CompletionOrchestrator::new(
            manager,
            Arc::new(GatedProvider {
                release: release.clone(),
            }),
            OrchestratorConfig::default(),
        ));

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.send("first").await })
        };
        while !orch.is_streaming() {
            tokio::task::yield_now().await;
        }

        assert_eq!(orch.send("second").await.unwrap(), SendOutcome::Ignored);
        assert!(orch.is_busy());

        release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome, SendOutcome::Streamed("done".into()));
        // One user message and one reply, no duplicate placeholder
        assert_eq!(orch.manager().len(), 2);
        assert!(!orch.is_busy());
    }
}
