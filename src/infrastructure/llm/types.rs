//! Wire types for the `generateContent` endpoint.

use serde::{Deserialize, Serialize};

/// `generateContent` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// System instruction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Conversation turns.
    pub contents: Vec<Content>,
    /// Sampling settings.
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Request with one user turn.
    pub fn single_turn(system: Option<&str>, prompt: &str, generation_config: GenerationConfig) -> Self {
        Self {
            system_instruction: system.map(|text| Content::text(None, text)),
            contents: vec![Content::text(Some("user"), prompt)],
            generation_config,
        }
    }
}

/// One turn of content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

/// One content part.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    /// Text of the part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Sampling settings.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
}

/// `generateContent` response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    /// Generated candidates.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// One generated candidate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    /// Generated content.
    #[serde(default)]
    pub content: Content,
}

impl GenerateContentResponse {
    /// First non-empty text part of the first candidate, trimmed.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .map(str::trim)
                    .find(|t| !t.is_empty())
            })
            .unwrap_or_default()
            .to_string()
    }
}
