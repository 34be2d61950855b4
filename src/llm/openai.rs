//! OpenAI-compatible chat completions client.
//!
//! Backs both capability traits with one `/v1/chat/completions`
//! endpoint: the analysis call pins `response_format` to a JSON object
//! and temperature to zero; the drafting call sends the role-tagged
//! history as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    check_http_response, AnalysisService, ChatMessage, DraftingService, LlmError, Role,
};

const DEFAULT_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completions request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ApiRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ApiMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Response format constraint (`{"type": "json_object"}` for analysis).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

/// A message in chat completions format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    /// Role string (`system`, `user`, `assistant`).
    pub role: String,
    /// Text content.
    pub content: String,
}

/// Chat completions response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    /// Response choices.
    pub choices: Vec<ApiChoice>,
}

/// A single response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ApiChoice {
    /// Assistant message for this choice.
    pub message: ApiResponseMessage,
}

/// Assistant message in a response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ApiResponseMessage {
    /// Text content, if any.
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the analysis request: system/user pair, JSON-object response.
#[doc(hidden)]
pub fn build_analysis_request(model: &str, system: &str, user: &str) -> ApiRequest {
    ApiRequest {
        model: model.to_owned(),
        messages: vec![
            ApiMessage {
                role: "system".to_owned(),
                content: system.to_owned(),
            },
            ApiMessage {
                role: "user".to_owned(),
                content: user.to_owned(),
            },
        ],
        temperature: Some(0.0),
        max_tokens: DEFAULT_MAX_TOKENS,
        response_format: Some(serde_json::json!({"type": "json_object"})),
    }
}

/// Build the drafting request from a role-tagged message sequence.
#[doc(hidden)]
pub fn build_draft_request(model: &str, messages: &[ChatMessage]) -> ApiRequest {
    ApiRequest {
        model: model.to_owned(),
        messages: messages
            .iter()
            .map(|m| ApiMessage {
                role: role_str(m.role).to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: None,
        max_tokens: DEFAULT_MAX_TOKENS,
        response_format: None,
    }
}

/// Extract the first choice's text content from a response body.
///
/// # Errors
///
/// Returns [`LlmError::Parse`] if the body does not deserialize, has no
/// choices, or the first choice carries no text.
#[doc(hidden)]
pub fn parse_completion_text(body: &str) -> Result<String, LlmError> {
    let resp: ApiResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;
    let text = resp
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LlmError::Parse("completion contained no text".to_owned()));
    }
    Ok(text)
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"__REDACTED__")
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Create a client for the given endpoint, model, and key.
    ///
    /// `base_url` is the API root, e.g. `https://api.openai.com`; the
    /// chat completions path is appended per call.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_completion(&self, request: &ApiRequest) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_completion_text(&body)
    }
}

#[async_trait::async_trait]
impl AnalysisService for OpenAiClient {
    async fn analyze(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        tracing::debug!(model = %self.model, "issuing analysis call");
        let request = build_analysis_request(&self.model, system, user);
        let text = self.post_completion(&request).await?;
        serde_json::from_str(&text)
            .map_err(|e| LlmError::Parse(format!("analysis verdict is not valid JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl DraftingService for OpenAiClient {
    async fn draft(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, turns = messages.len(), "issuing drafting call");
        let request = build_draft_request(&self.model, messages);
        self.post_completion(&request).await
    }
}
