//! The tuning surface threaded through the improvement loop.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Synthesis prompt template the engine should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    /// The engine's stock concise-answer prompt.
    #[default]
    Baseline,
    /// Concise prompt extended with per-category answering guidance
    /// (bugs state the fix, patterns name the mechanism, procedures list steps).
    CategoryGuidance,
}

impl PromptVariant {
    /// Whether the prompt carries per-category guidance.
    pub const fn has_category_guidance(self) -> bool {
        matches!(self, Self::CategoryGuidance)
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::CategoryGuidance => f.write_str("category_guidance"),
        }
    }
}

/// Immutable snapshot of every tunable value in effect for one iteration.
///
/// Strategies never mutate a state in place; they return a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    /// Minimum similarity for a chunk to be retrieved.
    pub threshold: f64,
    /// Number of chunks handed to synthesis.
    pub top_k: u32,
    /// Characters per chunk used when the engine builds its index.
    pub chunk_size: u32,
    /// Synthesis prompt template.
    pub prompt_variant: PromptVariant,
    /// Chunk size the current embedding index was built with.
    pub indexed_chunk_size: u32,
}

impl IterationState {
    /// State with the baseline prompt and a fresh index.
    pub fn new(threshold: f64, top_k: u32, chunk_size: u32) -> Self {
        Self {
            threshold,
            top_k,
            chunk_size,
            prompt_variant: PromptVariant::Baseline,
            indexed_chunk_size: chunk_size,
        }
    }

    /// Copy with a new threshold.
    pub fn with_threshold(self, threshold: f64) -> Self {
        Self { threshold, ..self }
    }

    /// Copy with a new top-k.
    pub fn with_top_k(self, top_k: u32) -> Self {
        Self { top_k, ..self }
    }

    /// Copy with a new chunk size; the index goes stale.
    pub fn with_chunk_size(self, chunk_size: u32) -> Self {
        Self { chunk_size, ..self }
    }

    /// Copy with a new synthesis prompt.
    pub fn with_prompt_variant(self, prompt_variant: PromptVariant) -> Self {
        Self {
            prompt_variant,
            ..self
        }
    }

    /// State after the embedding index has been rebuilt.
    pub fn reindexed(self) -> Self {
        Self {
            indexed_chunk_size: self.chunk_size,
            ..self
        }
    }

    /// Whether the index was built with a different chunk size than the one
    /// now configured.
    pub fn index_is_stale(&self) -> bool {
        self.indexed_chunk_size != self.chunk_size
    }

    /// The part of the state the engine reads from its tuning file.
    pub fn engine_tuning(&self) -> EngineTuning {
        EngineTuning {
            chunk_size: self.chunk_size,
            prompt_variant: self.prompt_variant,
        }
    }
}

/// Declarative engine configuration written by rebuild strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTuning {
    /// Characters per chunk.
    pub chunk_size: u32,
    /// Synthesis prompt template.
    pub prompt_variant: PromptVariant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_updates_leave_original_untouched() {
        let base = IterationState::new(0.15, 12, 1000);
        let next = base.with_threshold(0.12).with_top_k(16);

        assert!((base.threshold - 0.15).abs() < f64::EPSILON);
        assert_eq!(base.top_k, 12);
        assert!((next.threshold - 0.12).abs() < f64::EPSILON);
        assert_eq!(next.top_k, 16);
        assert_eq!(next.chunk_size, 1000);
    }

    #[test]
    fn chunk_change_marks_index_stale_until_reindexed() {
        let base = IterationState::new(0.15, 12, 1000);
        assert!(!base.index_is_stale());

        let smaller = base.with_chunk_size(500);
        assert!(smaller.index_is_stale());
        assert!(!smaller.reindexed().index_is_stale());
    }

    #[test]
    fn engine_tuning_serializes_snake_case() {
        let tuning = IterationState::new(0.15, 12, 500)
            .with_prompt_variant(PromptVariant::CategoryGuidance)
            .engine_tuning();
        let json = serde_json::to_value(tuning).unwrap();
        assert_eq!(json["chunk_size"], 500);
        assert_eq!(json["prompt_variant"], "category_guidance");
    }
}
