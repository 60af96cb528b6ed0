//! Full-context answering: the whole knowledge corpus in one prompt.
//!
//! Scores from this mode are the upper bound retrieval is measured against.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::models::{Category, PredictionResult};
use crate::domain::ports::completion::{CompletionClient, CompletionRequest};
use crate::infrastructure::llm::truncate_chars;

/// Corpus characters kept in the prompt.
pub const MAX_CORPUS_CHARS: usize = 900_000;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const SYSTEM_INSTRUCTION: &str = "You are a precise technical assistant. Answer the question \
using ONLY the provided knowledge base. Give a SHORT answer: 1-15 words. Use exact names, \
values, and terms from the knowledge. If the answer is not in the knowledge, say: Not found.";

/// Concatenate `<knowledge_dir>/<project>/<category>.md` for every category in
/// declaration order, skipping missing or blank files.
pub fn load_corpus(knowledge_dir: &Path, project: &str) -> std::io::Result<String> {
    let project_dir = knowledge_dir.join(project);
    let mut sections = Vec::new();
    for category in Category::ALL {
        let path = project_dir.join(format!("{}.md", category.as_str()));
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let content = content.trim();
                if !content.is_empty() {
                    sections.push(content.to_string());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(sections.join(SECTION_SEPARATOR))
}

/// Output budget for `model`; thinking models need room before they answer.
pub fn max_output_tokens(model: &str) -> u32 {
    if model.contains("2.5-pro") {
        4096
    } else {
        256
    }
}

/// Answers questions with the full corpus in context.
#[derive(Clone)]
pub struct CeilingAnswerer {
    client: Arc<dyn CompletionClient>,
    model: String,
    corpus: Arc<str>,
    timeout: Duration,
}

impl CeilingAnswerer {
    /// Answerer over `corpus`, truncated to the corpus limit.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        corpus: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            corpus: Arc::from(truncate_chars(corpus, MAX_CORPUS_CHARS)),
            timeout,
        }
    }

    /// Model answering the questions.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Corpus length in characters after truncation.
    pub fn corpus_chars(&self) -> usize {
        self.corpus.chars().count()
    }

    /// A reply mentioning "not found", or any failure, is an empty prediction.
    pub async fn answer(&self, question: &str) -> PredictionResult {
        let started = Instant::now();
        let request = CompletionRequest {
            model: self.model.clone(),
            system: Some(SYSTEM_INSTRUCTION.to_string()),
            prompt: format!(
                "{}\n\n---\nQUESTION: {question}\n\nShort answer (1-15 words):",
                self.corpus
            ),
            temperature: 0.0,
            max_output_tokens: max_output_tokens(&self.model),
            timeout: self.timeout,
        };

        let text = match self.client.complete(request).await {
            Ok(reply) if reply.to_lowercase().contains("not found") => String::new(),
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "ceiling answer failed");
                String::new()
            }
        };

        PredictionResult {
            text,
            latency: started.elapsed(),
            exit_status: None,
        }
    }
}
