//! Reading Errors
//!
//! Failure kinds of the reading flow. None of them is fatal: the Conductor
//! catches each one where the async operation ends and turns it into a
//! surface message. Ignored card selections are not errors at all, see
//! [`crate::selection::IgnoreReason`].

use thiserror::Error;

/// Failures surfaced to the user during a reading
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadingError {
    /// The interpretation request failed in transport or at the service
    #[error("interpretation request failed: {0}")]
    Requester(String),

    /// The service answered with no text
    #[error("the service returned an empty interpretation")]
    EmptyInterpretation,

    /// The follow-up chat could not be opened
    #[error("chat could not be opened: {0}")]
    ChatInit(String),

    /// A chat message failed before or during streaming
    #[error("message failed: {0}")]
    ChatSend(String),
}

impl ReadingError {
    /// Detail text without the kind prefix
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Requester(detail) | Self::ChatInit(detail) | Self::ChatSend(detail) => {
                detail.clone()
            }
            Self::EmptyInterpretation => self.to_string(),
        }
    }
}
