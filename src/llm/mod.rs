mod stream;

use std::{future::Future, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BackendSettings;

pub use stream::ndjson_tokens;

/// Lazy, single-pass sequence of text increments produced by the completion backend.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion backend at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("completion backend returned status {status}: {body}")]
    BackendStatus { status: u16, body: String },
    #[error("completion stream interrupted: {0}")]
    Transport(String),
    #[error("failed to send completion request: {0}")]
    Request(String),
}

/// Anything able to turn a prompt into a stream of tokens.
pub trait CompletionBackend: Send + Sync {
    fn stream_completion(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<TokenStream, LlmError>> + Send;
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// HTTP client for a locally running Ollama instance.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            // No overall timeout: a generation streams until the backend closes the connection.
            http: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            probe_timeout: settings.probe_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Probe the backend's base address. Any failure at all counts as "not available".
    pub async fn is_backend_available(&self) -> bool {
        match self
            .http
            .get(&self.base_url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(%err, base_url = %self.base_url, "backend probe failed");
                false
            }
        }
    }

    async fn open_stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    LlmError::Unreachable {
                        url: self.base_url.clone(),
                        reason: err.to_string(),
                    }
                } else {
                    LlmError::Request(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "completion request rejected");
            return Err(LlmError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = Box::pin(response.bytes_stream());
        Ok(ndjson_tokens(bytes).boxed())
    }
}

impl CompletionBackend for OllamaClient {
    fn stream_completion(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<TokenStream, LlmError>> + Send {
        self.open_stream(prompt)
    }
}

/// Drive a token stream to exhaustion and return the concatenated text.
pub async fn collect_tokens(mut tokens: TokenStream) -> Result<String, LlmError> {
    let mut text = String::new();
    while let Some(token) = tokens.next().await {
        text.push_str(&token?);
    }
    Ok(text)
}
