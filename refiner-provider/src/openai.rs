//! OpenAI-compatible provider implementation
//!
//! Both recognised backends expose the same `/chat/completions` endpoint, so
//! one client covers them; only the table entry differs.

use super::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::unexpected("failed to create HTTP client")
                    .with_operation("openai::new")
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    /// Resolve `id` against the provider table and build a client for it
    pub fn from_id(id: ProviderId, credentials: &Credentials) -> Result<Self> {
        Self::new(ProviderConfig::resolve(id, credentials)?)
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Tag an error with where it happened and which backend was involved
    fn annotate(&self, err: Error, model: &str) -> Error {
        err.with_operation("openai::complete")
            .with_context("provider", self.config.id.as_str())
            .with_context("model", model)
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        self.config.id.as_str()
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string());

        let api_request = OpenAIRequest::build(&model, &request);

        let mut req = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&api_request);

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        tracing::debug!(
            provider = self.name(),
            model = %model,
            temperature = ?request.temperature,
            messages = request.messages.len(),
            "sending completion request"
        );
        let started = Instant::now();

        let response = req.send().await.map_err(|e| {
            let message = if e.is_timeout() { "request timed out" } else { "request failed" };
            self.annotate(Error::network_failed(message).set_source(e), &model)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.annotate(status_error(status, body), &model));
        }

        let api_response: OpenAIResponse = response.json().await.map_err(|e| {
            self.annotate(
                Error::parse_failed("could not decode completion response").set_source(e),
                &model,
            )
        })?;

        let completion = api_response
            .into_completion()
            .map_err(|e| self.annotate(e, &model))?;

        tracing::debug!(
            provider = self.name(),
            model = %completion.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            finish_reason = ?completion.finish_reason,
            "completion received"
        );

        Ok(completion)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn status_error(status: StatusCode, body: String) -> Error {
    let message = api_error_message(&body).unwrap_or(body);
    let err = match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::new(refiner_error::ErrorKind::PermissionDenied, message)
        }
        s if s.is_server_error() => Error::inference_failed(message).temporary(),
        _ => Error::inference_failed(message),
    };
    err.with_context("status", status.as_u16().to_string())
}

/// Pull `error.message` out of an OpenAI-style error body, if it is one
fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<OpenAIErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

impl OpenAIRequest {
    fn build(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

impl OpenAIResponse {
    fn into_completion(self) -> Result<CompletionResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::inference_failed("No choices in response"))?;

        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: self.id,
            model: self.model,
            content: choice.message.content,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    #[serde(default)]
    message: String,
}
