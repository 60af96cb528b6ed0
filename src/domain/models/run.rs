//! Evaluation pass results and their order-independent aggregation.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::iteration::{IterationState, PromptVariant};
use super::qa::Category;

/// Outcome of asking one question, normalized so failures are just empty text.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Answer text; empty means "not found" or a failed invocation.
    pub text: String,
    /// Time taken to produce the answer.
    pub latency: Duration,
    /// Raw process exit code, `None` when the process never reported one
    /// (spawn failure, timeout, signal) or no process was involved.
    pub exit_status: Option<i32>,
}

impl PredictionResult {
    /// Empty prediction for a failed or empty invocation.
    pub fn empty(latency: Duration, exit_status: Option<i32>) -> Self {
        Self {
            text: String::new(),
            latency,
            exit_status,
        }
    }

    /// Whether nothing was predicted.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Scores for one item in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
    /// Token-overlap F1 in `[0, 1]`.
    pub f1: f64,
    /// Judge verdict as `0.0` or `1.0`; `None` when judging is disabled.
    pub judge: Option<f64>,
}

/// Immutable per-item result produced by a worker and merged by the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome<K> {
    /// Position of the item in the evaluated list; fixes reduction order.
    pub index: usize,
    /// Category or question type the item belongs to.
    pub key: K,
    /// Scores of the item.
    pub score: ScoreRecord,
    /// Whether the prediction was empty.
    pub prediction_empty: bool,
}

/// Aggregated statistics for one category, percentage-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Mean F1, in percent.
    #[serde(rename = "f1")]
    pub avg_f1: f64,
    /// Mean judge score, in percent.
    #[serde(rename = "judge")]
    pub avg_judge: f64,
    /// Items in the category.
    pub n: usize,
}

/// Result of reducing a batch of item outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate<K: Ord> {
    /// Mean F1 over every item, in percent.
    pub overall_f1: f64,
    /// Mean judge score over every item, in percent.
    pub overall_judge: f64,
    /// Statistics per key.
    pub by_key: BTreeMap<K, CategoryStats>,
    /// Items reduced.
    pub items: usize,
    /// Items with an empty prediction.
    pub not_found: usize,
}

impl<K: Ord> Aggregate<K> {
    /// Share of empty predictions, in percent.
    pub fn not_found_rate(&self) -> f64 {
        if self.items == 0 {
            0.0
        } else {
            self.not_found as f64 / self.items as f64 * 100.0
        }
    }
}

/// Mean of `values` scaled to a percentage; empty input is `0.0`.
pub fn percent_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64 * 100.0
    }
}

/// Reduce item outcomes into overall and per-key statistics.
///
/// Outcomes are ordered by item index before summing, so the result is
/// bit-identical whatever order workers completed in. Keys with no items do
/// not appear in the output.
pub fn aggregate<K: Ord + Copy>(mut outcomes: Vec<ItemOutcome<K>>) -> Aggregate<K> {
    outcomes.sort_by_key(|o| o.index);

    let mut f1_by_key: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    let mut judge_by_key: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    let mut all_f1 = Vec::with_capacity(outcomes.len());
    let mut all_judge = Vec::with_capacity(outcomes.len());
    let mut not_found = 0;

    for outcome in &outcomes {
        f1_by_key.entry(outcome.key).or_default().push(outcome.score.f1);
        all_f1.push(outcome.score.f1);
        if let Some(j) = outcome.score.judge {
            judge_by_key.entry(outcome.key).or_default().push(j);
            all_judge.push(j);
        }
        if outcome.prediction_empty {
            not_found += 1;
        }
    }

    let by_key = f1_by_key
        .into_iter()
        .map(|(key, f1s)| {
            let judges = judge_by_key.get(&key).map(Vec::as_slice).unwrap_or_default();
            let stats = CategoryStats {
                avg_f1: percent_mean(&f1s),
                avg_judge: percent_mean(judges),
                n: f1s.len(),
            };
            (key, stats)
        })
        .collect();

    Aggregate {
        overall_f1: percent_mean(&all_f1),
        overall_judge: percent_mean(&all_judge),
        by_key,
        items: outcomes.len(),
        not_found,
    }
}

/// How predictions were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Through the engine's retrieval pipeline.
    #[default]
    Retrieval,
    /// Whole knowledge corpus in the prompt; the upper bound.
    Ceiling,
}

/// Configuration a pass was run under, persisted as `args`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Retrieval or full-context.
    pub mode: RunMode,
    /// Engine project queried.
    pub project: String,
    /// Similarity threshold.
    pub threshold: f64,
    /// Retrieval candidate count.
    pub top_k: u32,
    /// Engine chunk size.
    pub chunk_size: u32,
    /// Synthesis prompt.
    pub prompt_variant: PromptVariant,
    /// Graph-augmented retrieval.
    pub use_graph: bool,
    /// Short answers requested.
    pub concise: bool,
    /// Engine answering model override.
    pub engine_model: Option<String>,
    /// Judge model, `None` when judging was off.
    pub judge_model: Option<String>,
    /// Full-context model, for ceiling runs.
    pub ceiling_model: Option<String>,
    /// Categories evaluated.
    pub categories: Vec<Category>,
    /// Cap on items per category.
    pub max_per_category: Option<usize>,
    /// Worker pool size.
    pub concurrency: usize,
}

impl RunConfig {
    /// Human-readable description of the configuration.
    pub fn label(&self) -> String {
        let mut parts = vec![format!("project={}", self.project)];
        match self.mode {
            RunMode::Ceiling => parts.push("FULL-CONTEXT (ceiling)".to_string()),
            RunMode::Retrieval => {
                parts.push(format!("t={} k={}", self.threshold, self.top_k));
                if let Some(model) = &self.engine_model {
                    parts.push(format!("model={model}"));
                }
                if self.use_graph {
                    parts.push("graph".to_string());
                }
            }
        }
        if self.judge_model.is_some() {
            parts.push("judge".to_string());
        }
        parts.join(" | ")
    }

    /// Copy with the tunable values of `state` applied.
    pub fn with_state(&self, state: &IterationState) -> Self {
        Self {
            threshold: state.threshold,
            top_k: state.top_k,
            chunk_size: state.chunk_size,
            prompt_variant: state.prompt_variant,
            ..self.clone()
        }
    }
}

/// One evaluation pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Mean F1 over every item, in percent.
    pub overall_f1: f64,
    /// Mean judge score over every item, in percent.
    pub overall_judge: f64,
    /// Wall time of the pass.
    #[serde(rename = "elapsed")]
    pub elapsed_seconds: f64,
    /// Human-readable configuration label.
    pub label: String,
    /// Statistics per category present in the run.
    pub by_category: BTreeMap<Category, CategoryStats>,
    /// Configuration the pass ran under.
    #[serde(rename = "args", default)]
    pub config: RunConfig,
    /// Share of empty predictions, in percent.
    #[serde(default)]
    pub not_found_rate: f64,
}

impl RunResult {
    /// Result of a pass from its reduced outcomes.
    pub fn from_aggregate(aggregate: &Aggregate<Category>, config: RunConfig, elapsed: Duration) -> Self {
        Self {
            overall_f1: aggregate.overall_f1,
            overall_judge: aggregate.overall_judge,
            elapsed_seconds: elapsed.as_secs_f64(),
            label: config.label(),
            by_category: aggregate.by_key.clone(),
            config,
            not_found_rate: aggregate.not_found_rate(),
        }
    }

    /// Whether this was a full-context run.
    pub fn is_ceiling(&self) -> bool {
        self.config.mode == RunMode::Ceiling || self.label.contains("FULL-CONTEXT")
    }

    /// Items scored across all categories.
    pub fn total_items(&self) -> usize {
        self.by_category.values().map(|s| s.n).sum()
    }

    /// This run's scores as a fraction of a ceiling run's.
    pub fn efficiency_against(&self, ceiling: &Self) -> RetrievalEfficiency {
        RetrievalEfficiency {
            f1: ratio(self.overall_f1, ceiling.overall_f1),
            judge: ratio(self.overall_judge, ceiling.overall_judge),
        }
    }
}

/// Retrieval score divided by ceiling score; `None` when the ceiling is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalEfficiency {
    /// F1 ratio.
    pub f1: Option<f64>,
    /// Judge ratio; `None` unless both runs were judged.
    pub judge: Option<f64>,
}

fn ratio(value: f64, ceiling: f64) -> Option<f64> {
    (ceiling > 0.0).then(|| value / ceiling)
}

/// Minimal view of a persisted run, tolerant of files written by older tools.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunSummary {
    /// Overall F1, in percent.
    pub overall_f1: f64,
    /// Overall judge score, in percent.
    pub overall_judge: f64,
    /// Share of empty predictions, in percent.
    pub not_found_rate: f64,
    /// Configuration label.
    pub label: String,
}
