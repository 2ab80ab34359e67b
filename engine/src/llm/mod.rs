//! Text Generation Abstraction Layer
//!
//! This module provides the boundary to the generative-text service. The
//! `TextGenerator` trait defines the contract the Planner and Executor call
//! through, so the service can be replaced by a scripted generator in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub mod retry;

/// Result type for text generation operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during text generation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether a retry of the same request may succeed
    ///
    /// Rate limits, timeouts, network failures and server-side errors are
    /// transient. Authentication, invalid requests and malformed responses
    /// are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimitExceeded
                | LLMError::Timeout
                | LLMError::NetworkError(_)
                | LLMError::ProviderUnavailable(_)
        )
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    System,
}

/// Optional generation parameters for a single request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_output_tokens: Some(max_output_tokens),
        }
    }
}

/// Generative-text service trait
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the name of the service (e.g., "gemini")
    fn name(&self) -> &str;

    /// Generate text for the conversation
    ///
    /// # Arguments
    /// * `messages` - System prompt followed by user turns
    /// * `params` - Per-request generation parameters
    ///
    /// # Returns
    /// * `Ok(String)` - The generated text
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message], params: GenerationParams) -> Result<String>;

    /// Check if the service is currently reachable with the configured credentials
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}
