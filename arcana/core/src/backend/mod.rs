//! Generation Backend Integration
//!
//! Abstracted access to the external text-generation service through a common
//! trait.
//!
//! # Available Backends
//!
//! - **Gemini**: Google's hosted API (default)
//! - **Ollama**: Local LLM server
//!
//! # Usage
//!
//! ```ignore
//! use arcana_core::backend::{GeminiBackend, GenerationBackend, GenerateRequest};
//!
//! let backend = GeminiBackend::from_env();
//! let request = GenerateRequest::new("Explain The Star", "gemini-2.5-flash");
//! let response = backend.generate(&request).await?;
//! ```

mod gemini;
mod ollama;
mod traits;

use std::sync::Arc;

pub use gemini::{GeminiBackend, DEFAULT_GEMINI_BASE_URL};
pub use ollama::OllamaBackend;
pub use traits::{
    BackendConfig, ChatContent, ContentRole, GenerateRequest, GenerateResponse, GenerationBackend,
    StreamingToken,
};

/// Build a shared backend from configuration
#[must_use]
pub fn from_config(config: &BackendConfig) -> Arc<dyn GenerationBackend> {
    match config {
        BackendConfig::Gemini { api_key, base_url } => {
            Arc::new(GeminiBackend::new(api_key.clone(), base_url.clone()))
        }
        BackendConfig::Ollama { host, port } => Arc::new(OllamaBackend::new(host.clone(), *port)),
    }
}
