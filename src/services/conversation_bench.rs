//! Conversational memory benchmark.
//!
//! Each conversation is loaded into its own throwaway project, questioned,
//! and forgotten again.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use futures::FutureExt;

use super::scorer::token_f1;
use crate::domain::models::{
    aggregate, Category, CategoryStats, Conversation, IterationState, ItemOutcome, QuestionType,
    ScoreRecord,
};
use crate::domain::ports::engine::{AskRequest, Engine};
use crate::infrastructure::llm::truncate_chars;

/// Session text kept per ingested entry.
pub const MAX_SESSION_CHARS: usize = 3000;

/// Published F1 scores on the same benchmark.
pub const BASELINES: [(&str, f64); 3] = [
    ("GPT-4 (no memory)", 32.1),
    ("Mem0", 67.1),
    ("Human ceiling", 87.9),
];

/// Project a conversation is ingested into.
pub fn namespace(conversation_id: &str) -> String {
    format!("locomo-eval-{conversation_id}")
}

/// Aggregated benchmark scores, percentage-scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    /// Mean F1 over every question, in percent.
    pub overall_f1: f64,
    /// Scores per question type.
    pub by_type: BTreeMap<QuestionType, CategoryStats>,
    /// Conversations evaluated.
    pub conversations: usize,
    /// Questions asked.
    pub questions: usize,
    /// Share of empty answers, in percent.
    pub not_found_rate: f64,
    /// Wall time of the benchmark.
    pub elapsed: Duration,
}

impl BenchReport {
    /// Gap to the strongest published memory system; negative once beaten.
    pub fn gap_to_best_memory_system(&self) -> f64 {
        BASELINES[1].1 - self.overall_f1
    }
}

/// Conversational memory benchmark over scoped engine projects.
pub struct ConversationBench {
    engine: Arc<dyn Engine>,
    state: IterationState,
    concurrency: usize,
    use_graph: bool,
    concise: bool,
}

impl ConversationBench {
    /// Benchmark asking with `state` on `concurrency` workers.
    pub fn new(engine: Arc<dyn Engine>, state: IterationState, concurrency: usize) -> Self {
        Self {
            engine,
            state,
            concurrency: concurrency.max(1),
            use_graph: false,
            concise: false,
        }
    }

    /// Build and use the knowledge graph.
    #[must_use]
    pub fn with_graph(mut self, use_graph: bool) -> Self {
        self.use_graph = use_graph;
        self
    }

    /// Ask for short answers.
    #[must_use]
    pub fn with_concise(mut self, concise: bool) -> Self {
        self.concise = concise;
        self
    }

    /// Evaluate every conversation on the worker pool and merge the results.
    pub async fn run(&self, conversations: &[Conversation]) -> BenchReport {
        let started = Instant::now();

        // Global item indices keep the reduction order fixed.
        let mut offsets = Vec::with_capacity(conversations.len());
        let mut next = 0;
        for conversation in conversations {
            offsets.push(next);
            next += conversation.qa_pairs.len();
        }

        let evaluations: Vec<_> = conversations
            .iter()
            .zip(offsets)
            .map(|(conversation, offset)| self.evaluate_conversation(conversation, offset))
            .collect();
        let outcomes: Vec<ItemOutcome<QuestionType>> = stream::iter(evaluations)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let aggregate = aggregate(outcomes);
        let report = BenchReport {
            overall_f1: aggregate.overall_f1,
            not_found_rate: aggregate.not_found_rate(),
            by_type: aggregate.by_key,
            conversations: conversations.len(),
            questions: aggregate.items,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            conversations = report.conversations,
            questions = report.questions,
            f1 = report.overall_f1,
            "conversation benchmark complete"
        );
        report
    }

    /// Ingest, question and always forget one conversation.
    ///
    /// The project is forgotten even if the body panics; the panic resumes
    /// once cleanup is done.
    async fn evaluate_conversation(
        &self,
        conversation: &Conversation,
        offset: usize,
    ) -> Vec<ItemOutcome<QuestionType>> {
        let project = namespace(&conversation.id);
        let outcomes = AssertUnwindSafe(self.ingest_and_ask(&project, conversation, offset))
            .catch_unwind()
            .await;

        if let Err(e) = self.engine.forget(&project).await {
            tracing::warn!(project = %project, error = %e, "failed to forget benchmark project");
        }
        match outcomes {
            Ok(outcomes) => outcomes,
            Err(payload) => {
                tracing::error!(project = %project, "benchmark conversation panicked after cleanup");
                panic::resume_unwind(payload)
            }
        }
    }

    async fn ingest_and_ask(
        &self,
        project: &str,
        conversation: &Conversation,
        offset: usize,
    ) -> Vec<ItemOutcome<QuestionType>> {
        let mut ingested = 0;
        for (session, text) in conversation.session_transcripts() {
            let content = truncate_chars(&text, MAX_SESSION_CHARS);
            let label = format!("session-{session}");
            match self.engine.add(project, Category::Solutions, &content, &label).await {
                Ok(()) => ingested += 1,
                Err(e) => tracing::warn!(project, label = %label, error = %e, "failed to ingest session"),
            }
        }
        if ingested == 0 {
            tracing::warn!(project, "no sessions ingested, skipping questions");
            return Vec::new();
        }

        if let Err(e) = self.engine.embed(project).await {
            tracing::warn!(project, error = %e, "embedding failed");
        }
        if self.use_graph {
            if let Err(e) = self.engine.build_graph(project).await {
                tracing::warn!(project, error = %e, "graph build failed");
            }
        }

        let mut outcomes = Vec::new();
        for (i, qa) in conversation.qa_pairs.iter().enumerate() {
            if qa.question.trim().is_empty() || qa.answer.trim().is_empty() {
                continue;
            }
            let request = AskRequest::new(qa.question.as_str(), project, &self.state)
                .with_graph(self.use_graph)
                .with_concise(self.concise);
            let prediction = self.engine.ask(&request).await;
            outcomes.push(ItemOutcome {
                index: offset + i,
                key: qa.question_type,
                score: ScoreRecord {
                    f1: token_f1(&prediction.text, &qa.answer),
                    judge: None,
                },
                prediction_empty: prediction.is_empty(),
            });
        }

        tracing::debug!(project, sessions = ingested, questions = outcomes.len(), "conversation evaluated");
        outcomes
    }
}
