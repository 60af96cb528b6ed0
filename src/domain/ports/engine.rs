//! Engine Port
//!
//! The retrieval/answering engine under test is an opaque collaborator. This
//! port describes the command surface the harness depends on; adapters decide
//! how those commands are delivered (subprocess, in-memory fake).

use async_trait::async_trait;

use crate::domain::errors::EngineError;
use crate::domain::models::{Category, IterationState, PredictionResult};

/// Substring the engine prints when retrieval found nothing usable.
pub const NOT_FOUND_SENTINEL: &str = "Not found in knowledge base";

/// Output lines starting with these are metadata, not answer text.
pub const METADATA_PREFIXES: [&str; 2] = ["Sources:", "Hint:"];

/// Parameters of one `ask` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AskRequest {
    /// Question text.
    pub question: String,
    /// Project to search.
    pub project: String,
    /// Minimum similarity.
    pub threshold: f64,
    /// Retrieval candidate count.
    pub top_k: u32,
    /// Expand retrieval through the knowledge graph.
    pub use_graph: bool,
    /// Ask for a short answer.
    pub concise: bool,
}

impl AskRequest {
    /// Request using the threshold and top-k of `state`.
    pub fn new(question: impl Into<String>, project: impl Into<String>, state: &IterationState) -> Self {
        Self {
            question: question.into(),
            project: project.into(),
            threshold: state.threshold,
            top_k: state.top_k,
            use_graph: false,
            concise: true,
        }
    }

    /// Set graph expansion.
    pub fn with_graph(mut self, use_graph: bool) -> Self {
        self.use_graph = use_graph;
        self
    }

    /// Set concise answers.
    pub fn with_concise(mut self, concise: bool) -> Self {
        self.concise = concise;
        self
    }
}

/// What `embed` reported about the rebuilt index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedSummary {
    /// Chunk count, when the engine printed one.
    pub total_chunks: Option<u64>,
}

/// Command surface of the engine.
///
/// `ask` never fails: any failure is folded into an empty prediction. The
/// other commands report failures so callers can log them, but callers treat
/// them as best-effort.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Answer one question. Failures give an empty prediction.
    async fn ask(&self, request: &AskRequest) -> PredictionResult;

    /// Store one knowledge entry in `project`.
    async fn add(
        &self,
        project: &str,
        category: Category,
        content: &str,
        label: &str,
    ) -> Result<(), EngineError>;

    /// Rebuild the embedding index of `project`.
    async fn embed(&self, project: &str) -> Result<EmbedSummary, EngineError>;

    /// Build the knowledge graph of `project`.
    async fn build_graph(&self, project: &str) -> Result<(), EngineError>;

    /// Irrecoverably delete the project's knowledge.
    async fn forget(&self, project: &str) -> Result<(), EngineError>;
}
