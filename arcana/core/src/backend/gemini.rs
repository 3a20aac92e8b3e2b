//! Gemini Backend Implementation
//!
//! Generation backend for the Google Gemini REST API.
//!
//! # Gemini API
//!
//! - `POST /v1beta/models/{model}:generateContent` - complete response
//! - `POST /v1beta/models/{model}:streamGenerateContent?alt=sse` - server-sent events
//! - `GET /v1beta/models` - used as a health check
//!
//! The key travels in the `x-goog-api-key` header. Without a key every request
//! fails before touching the network.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{
    BackendConfig, ContentRole, GenerateRequest, GenerateResponse, GenerationBackend,
    StreamingToken,
};

/// Public Gemini endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Time allowed to establish a connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request limit for a complete (non-streamed) response
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Gemini backend client
#[derive(Clone)]
pub struct GeminiBackend {
    /// API key (may be empty when unconfigured)
    api_key: String,
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a new Gemini backend
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            api_key: api_key.into(),
            base_url,
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
            BackendConfig::Gemini { api_key, base_url } => {
                Some(Self::new(api_key.clone(), base_url.clone()))
            }
            BackendConfig::Ollama { .. } => None,
        }
    }

    /// Create from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .unwrap_or_default();
        Self::new(api_key, std::env::var("GEMINI_BASE_URL").ok())
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }

    fn models_url(&self) -> String {
        format!("{}/v1beta/models", self.base_url)
    }

    /// Build the JSON request body
    fn build_body(request: &GenerateRequest) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = request
            .contents
            .iter()
            .map(|c| {
                let role = match c.role {
                    ContentRole::User => "user",
                    ContentRole::Model => "model",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": c.text }] })
            })
            .collect();

        let mut body = serde_json::json!({ "contents": contents });

        if let Some(ref system) = request.system {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        body
    }

    /// POST builder for a generation call
    ///
    /// Streamed bodies may run past any fixed limit, so only complete
    /// responses carry a request timeout.
    fn request_builder(
        &self,
        url: &str,
        request: &GenerateRequest,
        streaming: bool,
    ) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request));
        if streaming {
            builder
        } else {
            builder.timeout(GENERATE_TIMEOUT)
        }
    }

    async fn post(&self, builder: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        self.check_ready()?;

        let response = builder.send().await.context("Gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini returned {status}: {}", error_message(&body));
        }

        Ok(response)
    }
}

/// Pull the readable message out of a Gemini error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Extract the candidate text from one response object
fn extract_text(data: &serde_json::Value) -> anyhow::Result<String> {
    if let Some(message) = data.pointer("/error/message").and_then(|m| m.as_str()) {
        anyhow::bail!("Gemini error: {message}");
    }
    if let Some(reason) = data
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        anyhow::bail!("Prompt blocked by Gemini: {reason}");
    }

    let text = data
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

/// Incremental decoder for `text/event-stream` bodies
///
/// Buffers raw bytes so multi-byte characters split across network chunks
/// survive, and yields the payload of every complete `data:` line.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(payload) = line.trim_end().strip_prefix("data:") {
                let payload = payload.trim_start();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }
        payloads
    }

    /// Payload left over when the body ends without a final newline
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        line.trim_end()
            .strip_prefix("data:")
            .map(|p| p.trim_start().to_string())
            .filter(|p| !p.is_empty())
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn health_check(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        self.http_client
            .get(self.models_url())
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    fn check_ready(&self) -> anyhow::Result<()> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("no Gemini API key configured (set GEMINI_API_KEY or API_KEY)");
        }
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let url = self.generate_url(&request.model);
        let response = self.post(self.request_builder(&url, request, false)).await?;
        let data: serde_json::Value = response.json().await?;

        let content = extract_text(&data)?;
        let tokens_used = data
            .pointer("/usageMetadata/totalTokenCount")
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

        let url = self.stream_url(&request.model);
        let response = self.post(self.request_builder(&url, request, true)).await?;
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                };

                for payload in decoder.push(&bytes) {
                    if !forward_payload(&payload, &mut full_response, &tx).await {
                        return;
                    }
                }
            }

            if let Some(payload) = decoder.finish() {
                if !forward_payload(&payload, &mut full_response, &tx).await {
                    return;
                }
            }

            let _ = tx
                .send(StreamingToken::Complete {
                    message: full_response,
                })
                .await;
        });

        Ok(rx)
    }
}

/// Forward one SSE payload; returns false when streaming must stop
async fn forward_payload(
    payload: &str,
    full_response: &mut String,
    tx: &mpsc::Sender<StreamingToken>,
) -> bool {
    let parsed = serde_json::from_str::<serde_json::Value>(payload)
        .map_err(anyhow::Error::from)
        .and_then(|data| extract_text(&data));

    match parsed {
        Ok(text) if text.is_empty() => true,
        Ok(text) => {
            full_response.push_str(&text);
            // Receiver dropped means the session moved on
            tx.send(StreamingToken::Token(text)).await.is_ok()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Gemini stream payload rejected");
            let _ = tx.send(StreamingToken::Error(e.to_string())).await;
            false
        }
    }
}
