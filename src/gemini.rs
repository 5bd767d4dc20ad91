//! Gemini API client used by every agent
//!
//! Uses a long-lived reqwest::Client for connection pooling and applies the
//! fixed retry policy to transient failures.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_GEMINI_BASE_URL;
use crate::error::ServiceError;
use crate::models::Content;
use crate::Result;

/// Seam between the runner and the hosted model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse>;
}

/// =============================
/// Retry Policy
/// =============================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based); doubles, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    pub fn new(system_instruction: &str, contents: Vec<Content>) -> Self {
        Self {
            system_instruction: Some(Content {
                role: None,
                parts: vec![crate::models::Part::text(system_instruction)],
            }),
            contents,
            tools: Vec::new(),
            generation_config: None,
        }
    }

    pub fn with_functions(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        if !declarations.is_empty() {
            self.tools = vec![ToolSet {
                function_declarations: declarations,
            }];
        }
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Content of the first candidate, if the model produced any.
    pub fn into_content(self) -> Option<Content> {
        self.candidates.into_iter().next().and_then(|c| c.content)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

/// =============================
/// Client
/// =============================

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::ModelApi {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ServiceError::Llm(format!("Gemini parse error: {}", e.without_url()))
        })?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                model,
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        Ok(parsed)
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        if self.api_key.is_empty() {
            return Err(ServiceError::Config("GEMINI_API_KEY not configured".to_string()));
        }

        let mut attempt = 1;
        loop {
            match self.send_once(model, request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Gemini call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(model, attempt, error = %e, "Gemini call failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Part;
    use serde_json::json;
    use crate::frames::StreamFrame;
    use crate::models::TraceData;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn instant_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3}
        })
    }

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest::new("You are an auditor", vec![Content::user_text("What is RSI?")])
            .with_functions(vec![FunctionDeclaration {
                name: "MatchingAgent".into(),
                description: "Looks up facts".into(),
                parameters: json!({"type": "OBJECT"}),
            }]);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are an auditor");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["tools"][0]["functionDeclarations"][0]["name"], "MatchingAgent");
        assert!(value.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn test_generate_parses_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"functionCall": {"name": "MatchingAgent", "args": {"request": "3M capex"}}}
                    ]}
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key".into()).with_base_url(server.uri());
        let request = GenerateRequest::new("sys", vec![Content::user_text("hi")]);
        let content = client
            .generate("gemini-2.5-flash", &request)
            .await
            .unwrap()
            .into_content()
            .unwrap();

        let call = content.parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.name, "MatchingAgent");
        assert_eq!(call.args["request"], "3M capex");
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new("k".into())
            .with_base_url(server.uri())
            .with_retry(instant_retry());
        let request = GenerateRequest::new("sys", vec![Content::user_text("hi")]);
        let content = client.generate("m", &request).await.unwrap().into_content().unwrap();
        assert_eq!(content.text(), "ok");
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(5)
            .mount(&server)
            .await;

        let client = GeminiClient::new("k".into())
            .with_base_url(server.uri())
            .with_retry(instant_retry());
        let request = GenerateRequest::new("sys", vec![Content::user_text("hi")]);
        let err = client.generate("m", &request).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelApi { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_bad_request_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new("k".into())
            .with_base_url(server.uri())
            .with_retry(instant_retry());
        let request = GenerateRequest::new("sys", vec![Content {
            role: Some("user".into()),
            parts: vec![Part::text("hi")],
        }]);
        let err = client.generate("m", &request).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelApi { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_key_absent_from_transport_errors() {
        let client = GeminiClient::new("SECRET-KEY-123".into())
            .with_base_url("http://127.0.0.1:1")
            .with_retry(RetryPolicy {
                attempts: 1,
                ..instant_retry()
            });
        let request = GenerateRequest::new("sys", vec![Content::user_text("hi")]);

        let err = client.generate("m", &request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));

        let frame = StreamFrame::error(&err, TraceData::default()).to_json();
        assert!(!frame.contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn test_missing_key_rejected_without_request() {
        let client = GeminiClient::new(String::new());
        let request = GenerateRequest::new("sys", vec![]);
        let err = client.generate("m", &request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
