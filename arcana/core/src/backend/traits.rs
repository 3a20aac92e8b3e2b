//! Generation Backend Traits
//!
//! Trait definitions for text-generation backends. The reading core only ever
//! talks to a [`GenerationBackend`]; Gemini, Ollama or a test double sit behind
//! it without the Conductor noticing.
//!
//! # Contract
//!
//! - `generate`: one request, one complete response
//! - `generate_streaming`: a channel of [`StreamingToken`]s, finite and
//!   one-shot, ending with `Complete` or `Error`
//! - `check_ready`: configuration and credential check, no network call

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Token stream events from generation backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A fragment of the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message (concatenation of all fragments)
        message: String,
    },
    /// Error occurred during streaming
    Error(String),
}

impl StreamingToken {
    /// Whether no more tokens follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error(_))
    }
}

/// Author of a conversation entry sent to the service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    /// The person asking
    User,
    /// The model answering
    Model,
}

/// One entry of the conversation sent to the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContent {
    /// Who wrote it
    pub role: ContentRole,
    /// What was written
    pub text: String,
}

impl ChatContent {
    /// A user entry
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::User,
            text: text.into(),
        }
    }

    /// A model entry
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::Model,
            text: text.into(),
        }
    }
}

/// A generation request
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Conversation so far, ending with the newest user entry
    pub contents: Vec<ChatContent>,
    /// System instruction (optional)
    pub system: Option<String>,
}

impl GenerateRequest {
    /// A single-prompt request
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: vec![ChatContent::user(prompt)],
            system: None,
        }
    }

    /// A request carrying a whole conversation
    pub fn conversation(contents: Vec<ChatContent>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents,
            system: None,
        }
    }

    /// Set system instruction
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Text of the last user entry
    #[must_use]
    pub fn last_user_text(&self) -> Option<&str> {
        self.contents
            .iter()
            .rev()
            .find(|c| c.role == ContentRole::User)
            .map(|c| c.text.as_str())
    }
}

/// Response from a non-streaming request
#[derive(Clone, Debug)]
pub struct GenerateResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Generation backend trait
///
/// Implement this trait to add support for another text-generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Get the backend name (e.g., "Gemini", "Ollama")
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Check that the backend is configured well enough to accept requests
    ///
    /// Used when opening a chat; a missing credential fails here.
    fn check_ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Send a request and wait for the complete response
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// Send a request and get a streaming response
    ///
    /// Returns a channel receiver that yields fragments as they arrive. The
    /// channel closes after a terminal token. Dropping the receiver stops the
    /// stream.
    async fn generate_streaming(
        &self,
        request: &GenerateRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>>;
}

/// Backend connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendConfig {
    /// Google Gemini REST API
    Gemini {
        /// API key; empty when not configured
        api_key: String,
        /// Custom base URL (optional)
        base_url: Option<String>,
    },
    /// Direct Ollama connection
    Ollama {
        /// Ollama host address
        host: String,
        /// Ollama port number
        port: u16,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Gemini {
            api_key: String::new(),
            base_url: None,
        }
    }
}

impl BackendConfig {
    /// Create Ollama configuration
    pub fn ollama(host: impl Into<String>, port: u16) -> Self {
        Self::Ollama {
            host: host.into(),
            port,
        }
    }

    /// Create Gemini configuration with a key
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::Gemini {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    /// Short backend kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Ollama { .. } => "ollama",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_builder() {
        let request =
            GenerateRequest::new("Hello", "gemini-2.5-flash").with_system("You read tarot");

        assert_eq!(request.contents, vec![ChatContent::user("Hello")]);
        assert_eq!(request.model, "gemini-2.5-flash");
        assert_eq!(request.system, Some("You read tarot".to_string()));
        assert_eq!(request.last_user_text(), Some("Hello"));
    }

    #[test]
    fn test_last_user_text_skips_model_entries() {
        let request = GenerateRequest::conversation(
            vec![ChatContent::user("first"), ChatContent::model("reply")],
            "m",
        );
        assert_eq!(request.last_user_text(), Some("first"));
    }

    #[test]
    fn test_terminal_tokens() {
        assert!(!StreamingToken::Token("a".into()).is_terminal());
        assert!(StreamingToken::Error("x".into()).is_terminal());
        assert!(StreamingToken::Complete { message: String::new() }.is_terminal());
    }

    #[test]
    fn test_backend_config_default() {
        let config = BackendConfig::default();
        assert_eq!(config.kind(), "gemini");
        match config {
            BackendConfig::Gemini { api_key, base_url } => {
                assert!(api_key.is_empty());
                assert!(base_url.is_none());
            }
            BackendConfig::Ollama { .. } => panic!("Expected Gemini config"),
        }
    }
}
