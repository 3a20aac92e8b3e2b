//! Ollama Backend Implementation
//!
//! Generation backend for Ollama (local LLM server), for readings without a
//! cloud credential.
//!
//! # Ollama API
//!
//! - `/api/chat` - Chat completions with message history (streaming or batch)
//! - `/api/tags` - List available models (used as health check)
//!
//! Streaming responses are newline-delimited JSON objects.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{
    BackendConfig, ContentRole, GenerateRequest, GenerateResponse, GenerationBackend,
    StreamingToken,
};

/// Time allowed to establish a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request limit for a complete (non-streamed) response
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama backend client
#[derive(Clone)]
pub struct OllamaBackend {
    /// Host address
    host: String,
    /// Port number
    port: u16,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            http_client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create from `BackendConfig`
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        match config {
            BackendConfig::Ollama { host, port } => Some(Self::new(host.clone(), *port)),
            BackendConfig::Gemini { .. } => None,
        }
    }

    /// Create from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self::new(host, port)
    }

    /// Get the base URL
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get chat endpoint URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url())
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Build the chat request body; the system instruction leads the messages
    fn build_body(request: &GenerateRequest, stream: bool) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.contents.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }

        for content in &request.contents {
            let role = match content.role {
                ContentRole::User => "user",
                ContentRole::Model => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": content.text }));
        }

        serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        })
    }

    /// Chat request builder; only complete responses carry a request timeout
    fn request_builder(&self, request: &GenerateRequest, stream: bool) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(self.chat_url())
            .json(&Self::build_body(request, stream));
        if stream {
            builder
        } else {
            builder.timeout(GENERATE_TIMEOUT)
        }
    }

    async fn post(&self, builder: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        Ok(response)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new("localhost", 11434)
    }
}

/// One parsed NDJSON line: (fragment, done)
fn parse_chat_line(line: &str) -> anyhow::Result<(String, bool)> {
    let data: serde_json::Value = serde_json::from_str(line)?;
    if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
        anyhow::bail!("Ollama error: {error}");
    }
    let text = data
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();
    let done = data
        .get("done")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    Ok((text, done))
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    fn check_ready(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("no Ollama host configured");
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let response = self.post(self.request_builder(request, false)).await?;
        let data: serde_json::Value = response.json().await?;

        if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
            anyhow::bail!("Ollama error: {error}");
        }

        let content = data
            .pointer("/message/content")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        let tokens_used = data
            .get("eval_count")
            .and_then(serde_json::Value::as_u64)
            .and_then(|c| u32::try_from(c).ok());

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            tokens_used,
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }

    async fn generate_streaming(
        &self,
        request: &GenerateRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (tx, rx) = mpsc::channel(100);

        let response = self.post(self.request_builder(request, true)).await?;
        let mut stream = response.bytes_stream();

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);

                        // Parse newline-delimited JSON
                        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                            let raw: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&raw);
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }

                            match parse_chat_line(line) {
                                Ok((token, done)) => {
                                    if !token.is_empty() {
                                        full_response.push_str(&token);
                                        if tx.send(StreamingToken::Token(token)).await.is_err() {
                                            // Receiver dropped, stop streaming
                                            return;
                                        }
                                    }
                                    if done {
                                        let _ = tx
                                            .send(StreamingToken::Complete {
                                                message: full_response,
                                            })
                                            .await;
                                        return;
                                    }
                                }
                                Err(e) => {
                                    let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            // Stream ended without done signal
            if full_response.is_empty() {
                let _ = tx
                    .send(StreamingToken::Error(
                        "Ollama closed the stream without a response".to_string(),
                    ))
                    .await;
            } else {
                let _ = tx
                    .send(StreamingToken::Complete {
                        message: full_response,
                    })
                    .await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::ChatContent;

    #[test]
    fn test_ollama_backend_creation() {
        let backend = OllamaBackend::new("localhost", 11434);
        assert_eq!(backend.host, "localhost");
        assert_eq!(backend.port, 11434);
        assert_eq!(backend.base_url(), "http://localhost:11434");
        assert_eq!(backend.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_only_complete_responses_have_request_timeout() {
        let backend = OllamaBackend::default();
        let request = GenerateRequest::new("Hello", "llama3.2");

        let complete = backend.request_builder(&request, false).build().unwrap();
        assert_eq!(complete.timeout(), Some(&GENERATE_TIMEOUT));

        let streamed = backend.request_builder(&request, true).build().unwrap();
        assert_eq!(streamed.timeout(), None);
        assert_eq!(streamed.url().path(), "/api/chat");
    }

    #[test]
    fn test_build_body() {
        // Simple prompt
        let body = OllamaBackend::build_body(&GenerateRequest::new("Hello", "llama3.2"), true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], true);
        assert!(body.get("options").is_none());

        // With system and history
        let request = GenerateRequest::conversation(
            vec![ChatContent::user("Read"), ChatContent::model("The Sun")],
            "llama3.2",
        )
        .with_system("Be a tarot reader");
        let body = OllamaBackend::build_body(&request, false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], "The Sun");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_parse_chat_line() {
        let (text, done) =
            parse_chat_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(text, "Hi");
        assert!(!done);

        let (text, done) = parse_chat_line(r#"{"done":true,"eval_count":12}"#).unwrap();
        assert!(text.is_empty());
        assert!(done);

        assert!(parse_chat_line(r#"{"error":"model not found"}"#).is_err());
        assert!(parse_chat_line("garbage").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = BackendConfig::Ollama {
            host: "example.com".to_string(),
            port: 8080,
        };

        let backend = OllamaBackend::from_config(&config).unwrap();
        assert_eq!(backend.host, "example.com");
        assert_eq!(backend.port, 8080);

        // Wrong config type returns None
        assert!(OllamaBackend::from_config(&BackendConfig::gemini("key")).is_none());
    }
}
