//! Follow-up Chat
//!
//! A stateful conversation about one reading. The handle owns the system
//! instruction and the accumulated history; callers only pass the new message
//! and never resend what came before.
//!
//! The history starts with one exchange: a synthetic user turn naming the
//! drawn cards and the interpretation as the model's answer. An exchange is
//! committed only once its reply streamed to completion.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::{ChatContent, GenerateRequest, GenerationBackend, StreamingToken};
use crate::error::ReadingError;
use crate::messages::{MessageId, TurnRole};

/// An open chat with the generation service
#[derive(Clone)]
pub struct ChatHandle {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    system_instruction: String,
    history: Arc<Mutex<Vec<ChatContent>>>,
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("history_len", &self.history.lock().len())
            .finish_non_exhaustive()
    }
}

impl ChatHandle {
    /// Open a chat seeded with the given history
    ///
    /// Fails when the backend is not ready (missing credential) or no model is
    /// configured.
    pub fn open(
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
        history: Vec<ChatContent>,
    ) -> Result<Self, ReadingError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ReadingError::ChatInit("no model configured".to_string()));
        }
        backend
            .check_ready()
            .map_err(|e| ReadingError::ChatInit(e.to_string()))?;

        tracing::debug!(
            backend = backend.name(),
            model = %model,
            history = history.len(),
            "Chat opened"
        );

        Ok(Self {
            backend,
            model,
            system_instruction: system_instruction.into(),
            history: Arc::new(Mutex::new(history)),
        })
    }

    /// Model the chat talks to
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// System instruction sent with every message
    #[must_use]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Snapshot of the committed history
    #[must_use]
    pub fn history(&self) -> Vec<ChatContent> {
        self.history.lock().clone()
    }

    /// Send a message and stream the reply
    ///
    /// The returned receiver yields `Token` fragments and ends with
    /// `Complete` or `Error`. When the reply completes, the message and the
    /// full reply are appended to the history before `Complete` is delivered.
    /// Dropping the receiver stops forwarding and nothing is committed.
    pub async fn send_stream(
        &self,
        message: &str,
    ) -> Result<mpsc::Receiver<StreamingToken>, ReadingError> {
        let mut contents = self.history();
        contents.push(ChatContent::user(message));
        let request = GenerateRequest::conversation(contents, self.model.clone())
            .with_system(self.system_instruction.clone());

        let mut upstream = self
            .backend
            .generate_streaming(&request)
            .await
            .map_err(|e| ReadingError::ChatSend(e.to_string()))?;

        let (tx, rx) = mpsc::channel(100);
        let history = Arc::clone(&self.history);
        let message = message.to_string();

        tokio::spawn(async move {
            let mut reply = String::new();
            while let Some(token) = upstream.recv().await {
                match token {
                    StreamingToken::Token(text) => {
                        reply.push_str(&text);
                        if tx.send(StreamingToken::Token(text)).await.is_err() {
                            return;
                        }
                    }
                    StreamingToken::Complete { message: full } => {
                        if tx.is_closed() {
                            return;
                        }
                        let full = if full.is_empty() { reply } else { full };
                        {
                            let mut history = history.lock();
                            history.push(ChatContent::user(message));
                            history.push(ChatContent::model(full.clone()));
                        }
                        let _ = tx.send(StreamingToken::Complete { message: full }).await;
                        return;
                    }
                    StreamingToken::Error(e) => {
                        let _ = tx.send(StreamingToken::Error(e)).await;
                        return;
                    }
                }
            }
            // Upstream closed without a terminal token; the receiver sees a
            // closed channel and treats it as a failure
        });

        Ok(rx)
    }
}

/// One entry of the visible chat transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Turn identifier
    pub id: MessageId,
    /// Who the turn belongs to
    pub role: TurnRole,
    /// Text so far
    pub text: String,
    /// Whether more text will follow
    pub streaming: bool,
}

impl ChatTurn {
    /// A finished turn
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text: text.into(),
            streaming: false,
        }
    }

    /// An empty assistant turn to be filled progressively
    #[must_use]
    pub fn streaming_assistant() -> Self {
        Self {
            id: MessageId::new(),
            role: TurnRole::Assistant,
            text: String::new(),
            streaming: true,
        }
    }

    /// Append a fragment
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Mark streaming as complete
    pub fn complete(&mut self) {
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::{ContentRole, GenerateResponse};

    /// Streams the given fragments and records each request it sees
    struct RecordingBackend {
        fragments: Vec<&'static str>,
        ready: bool,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl RecordingBackend {
        fn new(fragments: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                ready: true,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "Recording"
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn check_ready(&self) -> anyhow::Result<()> {
            if self.ready {
                Ok(())
            } else {
                anyhow::bail!("missing API key")
            }
        }

        async fn generate(&self, _request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            anyhow::bail!("not used")
        }

        async fn generate_streaming(
            &self,
            request: &GenerateRequest,
        ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
            self.requests.lock().push(request.clone());
            let (tx, rx) = mpsc::channel(10);
            let fragments = self.fragments.clone();
            tokio::spawn(async move {
                let mut full = String::new();
                for fragment in fragments {
                    full.push_str(fragment);
                    let _ = tx.send(StreamingToken::Token(fragment.to_string())).await;
                }
                let _ = tx.send(StreamingToken::Complete { message: full }).await;
            });
            Ok(rx)
        }
    }

    fn seed() -> Vec<ChatContent> {
        vec![
            ChatContent::user("I drew the cards The Sun, please interpret."),
            ChatContent::model("Joy and success."),
        ]
    }

    async fn drain(mut rx: mpsc::Receiver<StreamingToken>) -> Vec<StreamingToken> {
        let mut tokens = Vec::new();
        while let Some(token) = rx.recv().await {
            tokens.push(token);
        }
        tokens
    }

    #[tokio::test]
    async fn test_open_rejects_unready_backend() {
        let backend = Arc::new(RecordingBackend {
            fragments: vec![],
            ready: false,
            requests: Mutex::new(Vec::new()),
        });
        let err = ChatHandle::open(backend, "m", "sys", seed()).unwrap_err();
        assert_eq!(err, ReadingError::ChatInit("missing API key".to_string()));
    }

    #[tokio::test]
    async fn test_open_rejects_empty_model() {
        let err = ChatHandle::open(RecordingBackend::new(vec![]), " ", "sys", seed()).unwrap_err();
        assert!(matches!(err, ReadingError::ChatInit(_)));
    }

    #[tokio::test]
    async fn test_send_carries_history_and_commits_exchange() {
        let backend = RecordingBackend::new(vec!["Lo", "ve"]);
        let chat = ChatHandle::open(backend.clone(), "m", "sys", seed()).unwrap();

        let tokens = drain(chat.send_stream("What about love?").await.unwrap()).await;
        assert_eq!(
            tokens.last(),
            Some(&StreamingToken::Complete {
                message: "Love".to_string()
            })
        );

        let request = backend.requests.lock()[0].clone();
        assert_eq!(request.system.as_deref(), Some("sys"));
        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.last_user_text(), Some("What about love?"));

        let history = chat.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], ChatContent::user("What about love?"));
        assert_eq!(history[3].role, ContentRole::Model);
        assert_eq!(history[3].text, "Love");

        // The next send carries the committed exchange
        drain(chat.send_stream("And career?").await.unwrap()).await;
        assert_eq!(backend.requests.lock()[1].contents.len(), 5);
    }

    #[test]
    fn test_streaming_turn() {
        let mut turn = ChatTurn::streaming_assistant();
        turn.append("Hel");
        turn.append("lo");
        assert!(turn.streaming);
        turn.complete();
        assert_eq!(turn.text, "Hello");
        assert!(!turn.streaming);
        assert_eq!(turn.role, TurnRole::Assistant);
    }
}
