//! Completion Port
//!
//! Generic text completion used for judging and ceiling answers.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::LlmError;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model name.
    pub model: String,
    /// Optional system instruction
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
    /// Time limit for the whole call, retries included.
    pub timeout: Duration,
}

/// Remote text completion.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generated text, trimmed. An empty string is a valid (empty) reply.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
