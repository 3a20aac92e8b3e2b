//! Interpretation Requester
//!
//! Sends the interpretation prompt for a completed spread as one non-streaming
//! request. The request runs on its own task so the Conductor keeps handling
//! events; the outcome comes back over a oneshot channel tagged with the
//! session that asked for it.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::backend::{GenerateRequest, GenerationBackend};
use crate::error::ReadingError;
use crate::format::format_markup;
use crate::language::Language;
use crate::messages::SessionId;

/// The initial reading for a completed spread
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interpretation {
    text: String,
}

impl Interpretation {
    /// Wrap a non-empty response text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Full text as returned by the service
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Formatted markup
    #[must_use]
    pub fn markup(&self, language: Language) -> String {
        format_markup(language, &self.text)
    }
}

/// Request an interpretation and wait for it
///
/// Whitespace-only text counts as a failure.
pub async fn request_interpretation(
    backend: &dyn GenerationBackend,
    model: &str,
    prompt: String,
) -> Result<Interpretation, ReadingError> {
    let request = GenerateRequest::new(prompt, model);
    let response = backend
        .generate(&request)
        .await
        .map_err(|e| ReadingError::Requester(e.to_string()))?;

    if response.content.trim().is_empty() {
        return Err(ReadingError::EmptyInterpretation);
    }

    tracing::debug!(
        backend = backend.name(),
        chars = response.content.chars().count(),
        tokens = ?response.tokens_used,
        "Interpretation received"
    );
    Ok(Interpretation::new(response.content))
}

/// Outcome delivered back to the Conductor
#[derive(Debug)]
pub struct InterpretationOutcome {
    /// Session the request was made for
    pub session_id: SessionId,
    /// What the request produced
    pub result: Result<Interpretation, ReadingError>,
}

/// An interpretation request running on its own task
///
/// Dropping it aborts the task.
#[derive(Debug)]
pub struct PendingInterpretation {
    session_id: SessionId,
    handle: JoinHandle<()>,
    rx: oneshot::Receiver<InterpretationOutcome>,
}

impl PendingInterpretation {
    /// Spawn the request
    pub fn spawn(
        backend: Arc<dyn GenerationBackend>,
        model: String,
        prompt: String,
        session_id: SessionId,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        let tagged = session_id.clone();
        let handle = tokio::spawn(async move {
            let result = request_interpretation(backend.as_ref(), &model, prompt).await;
            // Receiver gone means the session ended
            let _ = tx.send(InterpretationOutcome {
                session_id: tagged,
                result,
            });
        });
        Self {
            session_id,
            handle,
            rx,
        }
    }

    /// Take the outcome if it has arrived
    ///
    /// A task that died without answering yields a requester failure.
    pub fn try_take(&mut self) -> Option<InterpretationOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(InterpretationOutcome {
                session_id: self.session_id.clone(),
                result: Err(ReadingError::Requester(
                    "interpretation task ended without a result".to_string(),
                )),
            }),
        }
    }
}

impl Drop for PendingInterpretation {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
