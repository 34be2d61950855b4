//! Language service abstraction.
//!
//! The pipeline consumes two distinct capabilities, kept as separate
//! traits so each can be stubbed and replaced independently even though
//! one client instance usually backs both:
//!
//! - [`AnalysisService`]: a structured-decision call: system/user prompt
//!   pair in, JSON verdict object out.
//! - [`DraftingService`]: a generation call: role-tagged message
//!   sequence in, free text out.
//!
//! [`openai::OpenAiClient`] implements both against any OpenAI-compatible
//! `/v1/chat/completions` endpoint.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod openai;

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

/// Conversation participant role as seen by the language service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction context.
    System,
    /// Counterparty-side input.
    User,
    /// The agent's own prior turns.
    Assistant,
}

/// A single role-tagged message sent to the language service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl ChatMessage {
    /// System-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant-role message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by the language service client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP transport failure.
    #[error("language service request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected shape.
    #[error("language service response parse error: {0}")]
    Parse(String),
    /// Upstream responded with a non-success status.
    #[error("language service returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check an HTTP response status and return the body, or a structured error.
///
/// # Errors
///
/// Returns [`LlmError::Request`] on transport failure and
/// [`LlmError::HttpStatus`] (with a sanitized body) on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse, redact, and truncate an upstream error body before it is
/// logged or propagated. API-key-shaped substrings are never surfaced.
pub fn sanitize_error_body(raw: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 256;

    let mut sanitized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for pattern in [r"sk-[A-Za-z0-9_\-]{16,}", r"Bearer [A-Za-z0-9._\-]{16,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened: String = sanitized.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{shortened}...[truncated]");
    }
    sanitized
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Structured-decision capability: one call, JSON object back.
///
/// Implementations must be `Send + Sync`; the pipeline holds them behind
/// an `Arc` and awaits each call to completion before continuing.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Ask for a JSON verdict given a system prompt and a user payload.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, status, or JSON parse failure.
    async fn analyze(&self, system: &str, user: &str) -> Result<serde_json::Value, LlmError>;
}

/// Free-text generation capability over a role-tagged message sequence.
#[async_trait]
pub trait DraftingService: Send + Sync {
    /// Ask for a drafted reply given the full prompt sequence.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, status, or empty-response failure.
    async fn draft(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
