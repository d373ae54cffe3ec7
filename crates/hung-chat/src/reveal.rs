//! Cosmetic progressive reveal of text
//!
//! Independent of how the text arrived: given a string, emit prefixes one
//! character longer at a fixed pace until the whole string is shown.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Default delay between revealed characters
pub const DEFAULT_PACE: Duration = Duration::from_millis(30);

/// Reveal configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    /// Delay before each character appears
    pub pace: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self { pace: DEFAULT_PACE }
    }
}

/// One step of a reveal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealFrame {
    /// Prefix of the content shown so far
    pub text: String,
    /// This frame shows the whole content
    pub complete: bool,
}

/// A stream of reveal frames
pub type RevealStream = Pin<Box<dyn Stream<Item = RevealFrame> + Send>>;

/// Reveal `content` one character per `pace`.
///
/// When `enabled` is false the only frame is the full content, emitted
/// without delay. The stream ends after the complete frame, or silently
/// once `cancel` fires.
pub fn reveal(
    content: String,
    enabled: bool,
    pace: Duration,
    cancel: CancellationToken,
) -> RevealStream {
    Box::pin(stream! {
        if !enabled || content.is_empty() {
            yield RevealFrame { text: content, complete: true };
            return;
        }

        let ends: Vec<usize> = content
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect();
        let total = ends.len();

        for (n, end) in ends.into_iter().enumerate() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(pace) => {}
            }
            yield RevealFrame {
                text: content[..end].to_string(),
                complete: n + 1 == total,
            };
        }
    })
}

/// What the display should show right now
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealState {
    /// Increments each time the reveal restarts
    pub activation: u64,
    pub text: String,
    pub complete: bool,
}

struct Activation {
    id: u64,
    content: String,
    enabled: bool,
    cancel: CancellationToken,
}

/// Restartable reveal for a single display slot.
///
/// [`set`](Self::set) with new content (or a new `enabled` value) cancels
/// the running reveal and starts over from an empty prefix. A superseded
/// reveal never writes to the state again. Each activation reports
/// completion exactly once, on [`completions`](Self::completions).
pub struct RevealDriver {
    config: RevealConfig,
    state_tx: Arc<watch::Sender<RevealState>>,
    completion_tx: broadcast::Sender<u64>,
    current: Mutex<Option<Activation>>,
}

impl RevealDriver {
    pub fn new(config: RevealConfig) -> Self {
        let (state_tx, _) = watch::channel(RevealState::default());
        let (completion_tx, _) = broadcast::channel(16);
        Self {
            config,
            state_tx: Arc::new(state_tx),
            completion_tx,
            current: Mutex::new(None),
        }
    }

    /// Watch the displayed state
    pub fn watch(&self) -> watch::Receiver<RevealState> {
        self.state_tx.subscribe()
    }

    /// Activation ids, sent when their reveal reaches full length
    pub fn completions(&self) -> broadcast::Receiver<u64> {
        self.completion_tx.subscribe()
    }

    /// Current displayed state
    pub fn state(&self) -> RevealState {
        self.state_tx.borrow().clone()
    }

    /// Show `content`, revealing it progressively when `enabled`.
    ///
    /// Returns the activation id. Setting the same content and flag again
    /// keeps the running (or finished) reveal unless it was cancelled.
    /// Must be called within a tokio runtime.
    pub fn set(&self, content: impl Into<String>, enabled: bool) -> u64 {
        let content = content.into();
        let mut current = self.current.lock();

        if let Some(active) = current.as_ref() {
            // A cancelled activation is dead; identical input starts a new one
            if active.content == content
                && active.enabled == enabled
                && !active.cancel.is_cancelled()
            {
                return active.id;
            }
            active.cancel.cancel();
        }

        let id = current.as_ref().map_or(1, |a| a.id + 1);
        let cancel = CancellationToken::new();
        *current = Some(Activation {
            id,
            content: content.clone(),
            enabled,
            cancel: cancel.clone(),
        });

        if !enabled {
            self.state_tx.send_replace(RevealState {
                activation: id,
                text: content,
                complete: true,
            });
            let _ = self.completion_tx.send(id);
            return id;
        }

        self.state_tx.send_replace(RevealState {
            activation: id,
            text: String::new(),
            complete: false,
        });

        let state_tx = Arc::clone(&self.state_tx);
        let completion_tx = self.completion_tx.clone();
        let mut frames = reveal(content, true, self.config.pace, cancel);
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let complete = frame.complete;
                // Checked under the channel lock, so a restart in between
                // cannot be overwritten by this superseded activation
                let applied = state_tx.send_if_modified(|state| {
                    if state.activation != id {
                        return false;
                    }
                    state.text = frame.text;
                    state.complete = complete;
                    true
                });
                if !applied {
                    break;
                }
                if complete {
                    let _ = completion_tx.send(id);
                }
            }
        });

        id
    }

    /// Stop the running reveal, leaving the state where it is
    pub fn cancel(&self) {
        if let Some(active) = self.current.lock().as_ref() {
            active.cancel.cancel();
        }
    }
}

impl Drop for RevealDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: RevealStream) -> Vec<RevealFrame> {
        stream.collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefixes_grow_by_one_char() {
        let frames = collect(reveal("abc".into(), true, DEFAULT_PACE, CancellationToken::new())).await;
        let texts: Vec<&str> = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "ab", "abc"]);
        assert_eq!(
            frames.iter().map(|f| f.complete).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing() {
        let start = tokio::time::Instant::now();
        let frames = collect(reveal(
            "hello".into(),
            true,
            Duration::from_millis(30),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(frames.len(), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_shows_everything_at_once() {
        let start = tokio::time::Instant::now();
        let frames = collect(reveal("hello".into(), false, DEFAULT_PACE, CancellationToken::new())).await;
        assert_eq!(
            frames,
            vec![RevealFrame {
                text: "hello".into(),
                complete: true
            }]
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multibyte_boundaries() {
        let frames = collect(reveal("héé".into(), true, DEFAULT_PACE, CancellationToken::new())).await;
        let texts: Vec<&str> = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["h", "hé", "héé"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_completes_immediately() {
        let frames = collect(reveal(String::new(), true, DEFAULT_PACE, CancellationToken::new())).await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_stream() {
        let cancel = CancellationToken::new();
        let mut stream = reveal("abcdef".into(), true, DEFAULT_PACE, cancel.clone());
        assert_eq!(stream.next().await.unwrap().text, "a");
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_reveals_and_completes_once() {
        let driver = RevealDriver::new(RevealConfig::default());
        let mut completions = driver.completions();
        let mut watch = driver.watch();

        let id = driver.set("hey", true);
        assert_eq!(driver.state().text, "");

        while !watch.borrow_and_update().complete {
            watch.changed().await.unwrap();
        }
        assert_eq!(driver.state().text, "hey");
        assert_eq!(completions.recv().await.unwrap(), id);

        // Re-setting identical input does not restart
        assert_eq!(driver.set("hey", true), id);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_restart_discards_superseded_steps() {
        let driver = RevealDriver::new(RevealConfig::default());
        let mut completions = driver.completions();

        let first = driver.set("aaaaaaaaaa", true);
        tokio::time::sleep(Duration::from_millis(65)).await;
        let partial = driver.state();
        assert_eq!(partial.activation, first);
        assert_eq!(partial.text, "aa");

        let second = driver.set("bb", true);
        assert_ne!(first, second);
        assert_eq!(driver.state().text, "");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let done = driver.state();
        assert_eq!(done.activation, second);
        assert_eq!(done.text, "bb");
        assert!(done.complete);

        assert_eq!(completions.recv().await.unwrap(), second);
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_restarts_same_input_after_cancel() {
        let driver = RevealDriver::new(RevealConfig::default());
        let mut completions = driver.completions();

        let first = driver.set("hello", true);
        tokio::time::sleep(Duration::from_millis(65)).await;
        driver.cancel();
        assert_eq!(driver.state().text, "he");

        let again = driver.set("hello", true);
        assert_ne!(again, first);
        assert_eq!(driver.state().text, "");

        tokio::time::sleep(Duration::from_secs(5)).await;
        let state = driver.state();
        assert_eq!(state.activation, again);
        assert_eq!(state.text, "hello");
        assert!(state.complete);
        assert_eq!(completions.try_recv().unwrap(), again);
        assert!(completions.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_disabled_is_immediate() {
        let driver = RevealDriver::new(RevealConfig::default());
        let mut completions = driver.completions();
        let id = driver.set("instant", false);
        let state = driver.state();
        assert_eq!(state.text, "instant");
        assert!(state.complete);
        assert_eq!(completions.try_recv().unwrap(), id);

        // Toggling the flag restarts the reveal
        let again = driver.set("instant", true);
        assert_ne!(again, id);
        assert_eq!(driver.state().text, "");
    }
}
