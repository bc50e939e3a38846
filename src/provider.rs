//! External generation endpoints.
//!
//! The text endpoint is an OpenAI-compatible chat completion server (LM Studio,
//! Ollama and similar). Both endpoint kinds are black boxes to the resilient
//! call wrapper: they report failures as [`CallError`] and leave retry and
//! circuit decisions to the caller.

use crate::config::ProviderConfig;
use crate::error::CallError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(1000),
        }
    }
}

/// Text generation endpoint: prompt in, raw text out.
#[async_trait]
pub trait TextGenerationEndpoint: Send + Sync {
    /// Identity used to key the endpoint's circuit breaker.
    fn endpoint_id(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, CallError>;
}

/// Optional per-item media endpoint. `Ok(None)` means "no media".
#[async_trait]
pub trait MediaGenerationEndpoint: Send + Sync {
    fn endpoint_id(&self) -> &str;

    async fn generate_media(&self, subject: &str) -> Result<Option<String>, CallError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// 5xx and 429 are transient; every other non-success status is a rejection.
pub fn classify_status(status: u16, body: String) -> CallError {
    match status {
        429 | 500..=599 => CallError::Unavailable {
            status,
            message: body,
        },
        _ => CallError::RemoteRejected {
            status,
            message: body,
        },
    }
}

fn map_http_error(endpoint: &str, timeout: Duration, error: reqwest::Error) -> CallError {
    if error.is_timeout() {
        CallError::Timeout {
            endpoint: endpoint.to_string(),
            after_ms: timeout.as_millis(),
        }
    } else if let Some(status) = error.status() {
        classify_status(status.as_u16(), error.to_string())
    } else if error.is_decode() {
        CallError::RemoteRejected {
            status: 200,
            message: format!("Malformed response: {}", error),
        }
    } else {
        CallError::Connection(error.to_string())
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, CallError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| CallError::Connection(format!("Failed to create HTTP client: {}", e)))
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint_id: String,
    model: String,
    api_key: Option<String>,
    completions_url: String,
    request_timeout: Duration,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, CallError> {
        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
            endpoint_id: format!("text:{}", config.base_url),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            completions_url: completions_url(&config.base_url),
            request_timeout,
        })
    }
}

fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

#[async_trait]
impl TextGenerationEndpoint for OpenAiCompatibleClient {
    fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, CallError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let mut builder = self
            .client
            .post(&self.completions_url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_http_error(&self.endpoint_id, self.request_timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status.as_u16(), error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| map_http_error(&self.endpoint_id, self.request_timeout, e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CallError::RemoteRejected {
                status: status.as_u16(),
                message: "No choices in response".to_string(),
            })?;

        debug!(
            endpoint = %self.endpoint_id,
            model = %self.model,
            response_len = content.len(),
            "Completion received"
        );
        Ok(content)
    }
}
