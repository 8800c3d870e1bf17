//! LLM client: the single point of entry for chat-completion calls.
//!
//! Speaks the OpenAI-compatible `chat/completions` wire format, so any
//! provider exposing it (Groq by default) can sit behind [`LlmClient`].
//! Callers depend on the [`CompletionClient`] trait, never on the HTTP type.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
pub mod provider;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const BACKOFF_BASE: Duration = Duration::from_millis(200);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("ai_provider_not_configured")]
    NotConfigured,

    #[error("ai_model_required")]
    ModelRequired,

    #[error("ai_provider_unsupported: {0}")]
    UnsupportedProvider(String),

    #[error("ai_transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ai_http_status_{status}")]
    Status { status: u16 },

    /// The provider answered 2xx but the body is not a usable completion.
    #[error("ai_invalid_response")]
    InvalidResponse,
}

/// Text returned by one successful completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    /// The full response body as received.
    pub raw: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per attempt, not across retries. Zero means [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// How a response status steers the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status.is_server_error() {
        StatusClass::Retryable
    } else {
        StatusClass::Fatal
    }
}

/// Sleep after failed attempt `attempt` (zero-based): 200ms × attempt², capped at 2s.
pub fn backoff_delay(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    BACKOFF_BASE
        .saturating_mul(attempt.saturating_mul(attempt))
        .min(BACKOFF_CAP)
}

/// HTTP completion client with bounded retries.
#[derive(Clone, Debug)]
pub struct LlmClient {
    client: Client,
    provider: String,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        if cfg.base_url.trim().is_empty() || cfg.api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured);
        }
        if cfg.model.trim().is_empty() {
            return Err(LlmError::ModelRequired);
        }
        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            provider: cfg.provider,
            base_url: cfg.base_url,
            api_key: cfg.api_key,
            model: cfg.model,
            max_retries: cfg.max_retries,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One HTTP round trip. `Ok` carries the status and body for the caller
    /// to classify; `Err` is a transport or read failure.
    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let request_body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompts::STRICT_JSON_SYSTEM,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
        };

        let mut attempt: u32 = 0;
        loop {
            let retries_left = attempt < self.max_retries;

            let failure = match self.send_once(&request_body).await {
                Err(e) => LlmError::Http(e),
                Ok((status, body)) => match classify_status(status) {
                    StatusClass::Success => {
                        let completion = decode_completion(body)?;
                        debug!(
                            "LLM call succeeded: provider={}, model={}, attempt={}",
                            self.provider, completion.model, attempt
                        );
                        return Ok(completion);
                    }
                    StatusClass::Fatal => {
                        warn!("LLM API returned {status}, not retrying");
                        return Err(LlmError::Status {
                            status: status.as_u16(),
                        });
                    }
                    StatusClass::Retryable => LlmError::Status {
                        status: status.as_u16(),
                    },
                },
            };

            if !retries_left {
                return Err(failure);
            }
            let delay = backoff_delay(attempt);
            warn!(
                "LLM call attempt {} failed ({failure}), retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn decode_completion(raw: String) -> Result<Completion, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(&raw).map_err(|_| LlmError::InvalidResponse)?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty())
        .ok_or(LlmError::InvalidResponse)?;
    Ok(Completion {
        content,
        model: parsed.model,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, max_retries: u32) -> LlmConfig {
        LlmConfig {
            provider: "groq".to_string(),
            base_url,
            api_key: "test-key".to_string(),
            model: "llama-test".to_string(),
            timeout: Duration::from_secs(5),
            max_retries,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "model": "llama-test",
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn test_backoff_delay_grows_quadratically_and_caps() {
        assert_eq!(backoff_delay(0), Duration::ZERO);
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(800));
        assert_eq!(backoff_delay(3), Duration::from_millis(1800));
        assert_eq!(backoff_delay(4), Duration::from_secs(2));
        assert_eq!(backoff_delay(50), Duration::from_secs(2));
    }

    #[test]
    fn test_classify_status_table() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::CREATED), StatusClass::Success);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::Retryable
        );
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), StatusClass::Fatal);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Fatal
        );
    }

    #[test]
    fn test_new_requires_url_key_and_model() {
        let mut cfg = config("http://localhost".to_string(), 0);
        cfg.api_key = String::new();
        assert!(matches!(LlmClient::new(cfg), Err(LlmError::NotConfigured)));

        let cfg = config(String::new(), 0);
        assert!(matches!(LlmClient::new(cfg), Err(LlmError::NotConfigured)));

        let mut cfg = config("http://localhost".to_string(), 0);
        cfg.model = " ".to_string();
        assert!(matches!(LlmClient::new(cfg), Err(LlmError::ModelRequired)));
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_and_zero_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "llama-test",
                "temperature": 0.0,
                "messages": [
                    {"role": "system", "content": prompts::STRICT_JSON_SYSTEM},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("{\"a\":1}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(config(format!("{}/chat/completions", server.uri()), 0)).unwrap();
        let completion = client.complete("hello").await.unwrap();
        assert_eq!(completion.content, "{\"a\":1}");
        assert_eq!(completion.model, "llama-test");
        assert!(completion.raw.contains("choices"));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri(), 2)).unwrap();
        let completion = client.complete("x").await.unwrap();
        assert_eq!(completion.content, "ok");
    }

    #[tokio::test]
    async fn test_server_error_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri(), 2)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 500 }));
        assert_eq!(err.to_string(), "ai_http_status_500");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri(), 3)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401 }));
    }

    #[tokio::test]
    async fn test_invalid_envelope_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"model": "m", "choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri(), 3)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("")))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri(), 0)).unwrap();
        assert!(matches!(
            client.complete("x").await,
            Err(LlmError::InvalidResponse)
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_after_retries() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = LlmClient::new(config("http://127.0.0.1:9/chat/completions".to_string(), 1)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }
}
