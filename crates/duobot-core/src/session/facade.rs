//! Entry point used by the message-handling layer
//!
//! The participant turn is appended under the key's lock, the lock is
//! released, the completion service is called with the returned window,
//! and the reply is appended under a fresh lock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::llm::CompletionService;
use crate::session::{SessionStore, Turn};
use crate::{Error, Result};

/// Reply sent when the completion service is unavailable
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, I can't answer right now. Please try again in a moment.";

/// Reply sent when the participant's message has no text
pub const EMPTY_MESSAGE_REPLY: &str = "Please send a message with some text.";

/// Result of a participant-initiated clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStatus {
    Cleared,
    NothingToClear,
}

impl ClearStatus {
    /// Text shown to the participant
    pub fn message(&self) -> &'static str {
        match self {
            ClearStatus::Cleared => "Conversation history cleared.",
            ClearStatus::NothingToClear => "There is no conversation history to clear.",
        }
    }
}

impl fmt::Display for ClearStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Conversation front door: append, complete, append
pub struct SessionFacade {
    store: Arc<SessionStore>,
    completion: Arc<dyn CompletionService>,
    completion_timeout: Duration,
    fallback_reply: String,
}

impl SessionFacade {
    /// Default bound on a single completion call
    pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(store: Arc<SessionStore>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            store,
            completion,
            completion_timeout: Self::DEFAULT_COMPLETION_TIMEOUT,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    /// Create a facade from the `[session]` configuration section
    pub fn from_config(
        store: Arc<SessionStore>,
        completion: Arc<dyn CompletionService>,
        config: &SessionConfig,
    ) -> Self {
        Self::new(store, completion)
            .with_completion_timeout(config.completion_timeout())
            .with_fallback_reply(config.fallback_reply.clone())
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn fallback_reply(&self) -> &str {
        &self.fallback_reply
    }

    /// Record the participant's message, ask for a completion and record
    /// the reply. Never fails: problems degrade to a text reply.
    pub async fn handle_turn(&self, key: &str, participant_text: &str) -> String {
        let turn = match Turn::participant(participant_text) {
            Ok(turn) => turn,
            Err(e) => {
                debug!(key = %key, "Rejected turn: {}", e);
                return EMPTY_MESSAGE_REPLY.to_string();
            }
        };

        let (session_id, window) = self.store.append(key, turn);
        info!(key = %key, history = window.len(), "Requesting completion");

        let reply = match self.request_completion(&window).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(key = %key, "{}", e);
                return self.fallback_reply.clone();
            }
        };

        let assistant_turn = match Turn::assistant(reply.as_str()) {
            Ok(turn) => turn,
            Err(e) => {
                warn!(key = %key, "Completion returned an unusable reply: {}", e);
                return self.fallback_reply.clone();
            }
        };

        if self
            .store
            .append_if_current(key, &session_id, assistant_turn)
            .is_none()
        {
            debug!(key = %key, "Session cleared or evicted during completion; reply not recorded");
        }

        reply
    }

    async fn request_completion(&self, window: &[Turn]) -> Result<String> {
        match tokio::time::timeout(self.completion_timeout, self.completion.complete(window)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(Error::CompletionUnavailable(e.to_string())),
            Err(_) => Err(Error::CompletionUnavailable(format!(
                "timed out after {:?}",
                self.completion_timeout
            ))),
        }
    }

    /// Drop the participant's conversation
    pub fn clear_session(&self, key: &str) -> ClearStatus {
        if self.store.clear(key) {
            ClearStatus::Cleared
        } else {
            ClearStatus::NothingToClear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ManualClock, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies "echo: <last turn>" and remembers what it was sent
    #[derive(Default)]
    struct EchoService {
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl CompletionService for EchoService {
        async fn complete(&self, turns: &[Turn]) -> Result<String> {
            self.seen.lock().unwrap().push(turns.to_vec());
            let last = turns.last().map(Turn::content).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    struct FailingService;

    #[async_trait]
    impl CompletionService for FailingService {
        async fn complete(&self, _turns: &[Turn]) -> Result<String> {
            Err(Error::LlmApi("503: overloaded".to_string()))
        }
    }

    struct SlowService;

    #[async_trait]
    impl CompletionService for SlowService {
        async fn complete(&self, _turns: &[Turn]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    struct BlankService;

    #[async_trait]
    impl CompletionService for BlankService {
        async fn complete(&self, _turns: &[Turn]) -> Result<String> {
            Ok("   ".to_string())
        }
    }

    /// Holds any completion for the text "slow" until released
    #[derive(Default)]
    struct GatedService {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CompletionService for GatedService {
        async fn complete(&self, turns: &[Turn]) -> Result<String> {
            if turns.last().map(Turn::content) == Some("slow") {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok("done".to_string())
        }
    }

    fn store(window: usize) -> Arc<SessionStore> {
        Arc::new(SessionStore::with_options(window, Arc::new(ManualClock::default())))
    }

    #[tokio::test]
    async fn test_handle_turn_records_both_turns() {
        let store = store(20);
        let service = Arc::new(EchoService::default());
        let facade = SessionFacade::new(Arc::clone(&store), service.clone());

        let reply = facade.handle_turn("u1", "hello").await;

        assert_eq!(reply, "echo: hello");
        let window = store.window("u1");
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role(), Role::Participant);
        assert_eq!(window[1].role(), Role::Assistant);
        assert_eq!(window[1].content(), "echo: hello");
    }

    #[tokio::test]
    async fn test_completion_sees_trimmed_window() {
        let store = store(2);
        let service = Arc::new(EchoService::default());
        let facade = SessionFacade::new(Arc::clone(&store), service.clone());

        facade.handle_turn("u1", "one").await;
        facade.handle_turn("u1", "two").await;

        let seen = service.seen.lock().unwrap();
        let last: Vec<&str> = seen[1].iter().map(Turn::content).collect();
        assert_eq!(last, vec!["echo: one", "two"]);
    }

    #[tokio::test]
    async fn test_failure_returns_fallback_without_assistant_turn() {
        let store = store(20);
        let facade = SessionFacade::new(Arc::clone(&store), Arc::new(FailingService))
            .with_fallback_reply("unavailable");

        let reply = facade.handle_turn("u1", "hello").await;

        assert_eq!(reply, "unavailable");
        let window = store.window("u1");
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role(), Role::Participant);
        assert_eq!(window[0].content(), "hello");
    }

    #[tokio::test]
    async fn test_timeout_returns_fallback_without_assistant_turn() {
        let store = store(20);
        let facade = SessionFacade::new(Arc::clone(&store), Arc::new(SlowService))
            .with_completion_timeout(Duration::from_millis(20));

        let reply = facade.handle_turn("u1", "hello").await;

        assert_eq!(reply, DEFAULT_FALLBACK_REPLY);
        let window = store.window("u1");
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].role(), Role::Participant);
    }

    #[tokio::test]
    async fn test_blank_reply_is_not_recorded() {
        let store = store(20);
        let facade = SessionFacade::new(Arc::clone(&store), Arc::new(BlankService));

        let reply = facade.handle_turn("u1", "hello").await;

        assert_eq!(reply, DEFAULT_FALLBACK_REPLY);
        assert_eq!(store.window("u1").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let store = store(20);
        let service = Arc::new(EchoService::default());
        let facade = SessionFacade::new(Arc::clone(&store), service.clone());

        let reply = facade.handle_turn("u1", "  ").await;

        assert_eq!(reply, EMPTY_MESSAGE_REPLY);
        assert!(store.get("u1").is_none());
        assert!(service.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_session_status() {
        let store = store(20);
        let facade = SessionFacade::new(Arc::clone(&store), Arc::new(EchoService::default()));

        assert_eq!(facade.clear_session("u1"), ClearStatus::NothingToClear);
        facade.handle_turn("u1", "hello").await;
        assert_eq!(facade.clear_session("u1"), ClearStatus::Cleared);
        assert!(store.get("u1").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_participants_do_not_mix() {
        let store = store(20);
        let facade = Arc::new(SessionFacade::new(
            Arc::clone(&store),
            Arc::new(EchoService::default()),
        ));

        let tasks = (0..10).map(|i| {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move {
                let key = format!("user-{}", i);
                facade.handle_turn(&key, &format!("message from {}", i)).await
            })
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        for i in 0..10 {
            let window = store.window(&format!("user-{}", i));
            assert_eq!(window.len(), 2);
            assert_eq!(window[0].content(), format!("message from {}", i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_completion_does_not_block_other_participants() {
        let store = store(20);
        let service = Arc::new(GatedService::default());
        let facade = Arc::new(SessionFacade::new(Arc::clone(&store), service.clone()));

        let slow = tokio::spawn({
            let facade = Arc::clone(&facade);
            async move { facade.handle_turn("a", "slow").await }
        });
        service.entered.notified().await;

        let reply = tokio::time::timeout(Duration::from_secs(5), facade.handle_turn("b", "fast"))
            .await
            .expect("participant b waited on participant a");
        assert_eq!(reply, "done");
        assert_eq!(store.window("b").len(), 2);

        // a's own key is not locked either while its completion is pending
        assert_eq!(store.window("a").len(), 1);
        assert_eq!(facade.clear_session("a"), ClearStatus::Cleared);

        service.release.notify_one();
        assert_eq!(slow.await.unwrap(), "done");
        assert!(store.get("a").is_none());
    }
}
