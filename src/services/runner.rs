//! One evaluation pass over a QA item list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tokio::time::timeout;

use super::ceiling::CeilingAnswerer;
use super::judge::LlmJudge;
use super::scorer::token_f1;
use crate::domain::models::{
    aggregate, Category, IterationState, ItemOutcome, PredictionResult, QaItem, RunConfig,
    RunResult, ScoreRecord,
};
use crate::domain::ports::engine::{AskRequest, Engine};

/// Where predictions come from.
#[derive(Clone)]
pub enum Predictor {
    /// The engine's retrieval pipeline.
    Retrieval {
        /// Engine to ask.
        engine: Arc<dyn Engine>,
        /// Project to search.
        project: String,
        /// Graph-augmented retrieval.
        use_graph: bool,
        /// Ask for short answers.
        concise: bool,
    },
    /// The whole corpus in one prompt.
    Ceiling(CeilingAnswerer),
}

impl Predictor {
    async fn predict(&self, question: &str, state: &IterationState) -> PredictionResult {
        match self {
            Self::Retrieval {
                engine,
                project,
                use_graph,
                concise,
            } => {
                let request = AskRequest::new(question, project.as_str(), state)
                    .with_graph(*use_graph)
                    .with_concise(*concise);
                engine.ask(&request).await
            }
            Self::Ceiling(answerer) => answerer.answer(question).await,
        }
    }
}

/// Runs items on a bounded pool and reduces their outcomes in one place.
pub struct EvaluationRunner {
    predictor: Predictor,
    judge: Option<LlmJudge>,
    concurrency: usize,
    item_timeout: Duration,
    progress: Option<ProgressBar>,
}

impl EvaluationRunner {
    /// Runner with `concurrency` workers and a per-item time limit.
    pub fn new(predictor: Predictor, concurrency: usize, item_timeout: Duration) -> Self {
        Self {
            predictor,
            judge: None,
            concurrency: concurrency.max(1),
            item_timeout,
            progress: None,
        }
    }

    /// Judge every prediction with `judge`.
    #[must_use]
    pub fn with_judge(mut self, judge: Option<LlmJudge>) -> Self {
        self.judge = judge;
        self
    }

    /// Advance `progress` as items finish.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Whether predictions are judged.
    pub fn judges(&self) -> bool {
        self.judge.is_some()
    }

    /// Evaluate every item under `state` and aggregate the scores.
    ///
    /// Individual failures score zero; the pass itself cannot fail.
    pub async fn run(&self, items: &[QaItem], state: &IterationState, config: RunConfig) -> RunResult {
        let started = Instant::now();
        if let Some(progress) = &self.progress {
            progress.reset();
            progress.set_length(items.len() as u64);
        }

        tracing::info!(
            items = items.len(),
            concurrency = self.concurrency,
            threshold = state.threshold,
            top_k = state.top_k,
            "starting evaluation pass"
        );

        let outcomes: Vec<ItemOutcome<Category>> = stream::iter(items.iter().enumerate())
            .map(|(index, item)| self.evaluate(index, item, state))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let aggregate = aggregate(outcomes);
        let result = RunResult::from_aggregate(&aggregate, config, started.elapsed());
        tracing::info!(
            f1 = result.overall_f1,
            judge = result.overall_judge,
            not_found_rate = result.not_found_rate,
            elapsed_secs = result.elapsed_seconds,
            "evaluation pass complete"
        );
        result
    }

    async fn evaluate(&self, index: usize, item: &QaItem, state: &IterationState) -> ItemOutcome<Category> {
        let scored = timeout(self.item_timeout, self.score(item, state)).await;
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }

        match scored {
            Ok((score, prediction_empty)) => ItemOutcome {
                index,
                key: item.category,
                score,
                prediction_empty,
            },
            Err(_) => {
                tracing::warn!(
                    index,
                    category = %item.category,
                    timeout_secs = self.item_timeout.as_secs(),
                    "item timed out, scoring zero"
                );
                ItemOutcome {
                    index,
                    key: item.category,
                    score: ScoreRecord {
                        f1: 0.0,
                        judge: self.judge.as_ref().map(|_| 0.0),
                    },
                    prediction_empty: true,
                }
            }
        }
    }

    async fn score(&self, item: &QaItem, state: &IterationState) -> (ScoreRecord, bool) {
        let prediction = self.predictor.predict(&item.question, state).await;
        let f1 = token_f1(&prediction.text, &item.gold_answer);
        let judge = match &self.judge {
            Some(judge) => Some(judge.judge(&item.question, &item.gold_answer, &prediction.text).await),
            None => None,
        };

        tracing::debug!(
            category = %item.category,
            f1,
            judge = ?judge,
            latency_ms = prediction.latency.as_millis() as u64,
            empty = prediction.is_empty(),
            "item scored"
        );

        (ScoreRecord { f1, judge }, prediction.is_empty())
    }
}
