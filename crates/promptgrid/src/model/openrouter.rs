use super::{ModelCaller, ModelFuture, ModelRequest};
use crate::api::retry::{RetryConfig, retry_cancellable};
use crate::error::ProviderError;
use crate::extract::strip_code_fences;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Zero/`None` fields are omitted.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output mode.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            fmt_type: "json_object",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
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

impl ChatRequest {
    /// Build the wire request for a [`ModelRequest`]. An empty system
    /// prompt sends only the user message.
    pub fn from_request(req: &ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !req.system_prompt.trim().is_empty() {
            messages.push(Message::system(&req.system_prompt));
        }
        messages.push(Message::user(&req.user_prompt));
        Self {
            model: req.model_id.clone(),
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            response_format: req.expect_json.then(ResponseFormat::json_object),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Turn raw completion text into the structured reply the engine sees.
///
/// JSON objects and arrays are parsed (after stripping code fences);
/// anything else is returned as a string value.
pub(crate) fn parse_reply(content: &str, expect_json: bool) -> Value {
    let stripped = strip_code_fences(content);
    if expect_json
        && let Ok(v @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(stripped)
    {
        return v;
    }
    Value::String(stripped.to_string())
}

// ── Caller ─────────────────────────────────────────────────────────

/// [`ModelCaller`] backed by the OpenRouter chat completions API.
pub struct OpenRouterCaller {
    client: reqwest::Client,
    url: String,
    referer: String,
    title: String,
    retry: RetryConfig,
}

impl OpenRouterCaller {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_headers("https://github.com/promptgrid/promptgrid", "promptgrid")
    }

    /// Create a caller with custom `HTTP-Referer` and `X-Title` headers.
    pub fn with_headers(
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("promptgrid/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| ProviderError::request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: OPENROUTER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Point at a compatible endpoint other than OpenRouter.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn send_once(&self, body: &ChatRequest, api_key: &str) -> Result<String, ProviderError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );
        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::request(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::request(format!("request failed: reading body: {e}")))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::request(format!(
                "OpenRouter API HTTP {status}: {text}"
            )));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::request(format!("failed to parse response: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(ProviderError::request(format!(
                "OpenRouter API error: {}",
                err.message
            )));
        }
        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
            );
        }

        Ok(parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

impl ModelCaller for OpenRouterCaller {
    fn call<'a>(&'a self, request: ModelRequest, cancel: &'a CancellationToken) -> ModelFuture<'a> {
        Box::pin(async move {
            let api_key = request
                .api_key
                .clone()
                .ok_or_else(|| ProviderError::MissingApiKey(request.model_id.clone()))?;
            let body = ChatRequest::from_request(&request);
            let content =
                retry_cancellable(&self.retry, cancel, || self.send_once(&body, &api_key)).await?;
            Ok(parse_reply(&content, request.expect_json))
        })
    }
}
