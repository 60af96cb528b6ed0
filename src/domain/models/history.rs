//! Append-only record of improvement loop iterations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::iteration::{IterationState, PromptVariant};
use super::run::RunResult;
use crate::domain::errors::StoreError;

/// One measured iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Iteration number, starting at 1.
    pub iteration: u32,
    /// Overall F1, in percent.
    pub f1: f64,
    /// Overall judge score, in percent.
    pub judge: f64,
    /// Threshold the iteration ran with.
    pub threshold: f64,
    /// Top-k the iteration ran with.
    pub top_k: u32,
    /// Engine chunk size at measurement time.
    pub chunk_size: u32,
    /// Synthesis prompt at measurement time.
    pub prompt_variant: PromptVariant,
    /// Strategies applied after this measurement, in catalog order.
    #[serde(default)]
    pub applied: Vec<String>,
    /// When the pass finished.
    pub measured_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Entry for `run`, measured under `state`.
    pub fn new(iteration: u32, state: &IterationState, run: &RunResult) -> Self {
        Self {
            iteration,
            f1: run.overall_f1,
            judge: run.overall_judge,
            threshold: state.threshold,
            top_k: state.top_k,
            chunk_size: state.chunk_size,
            prompt_variant: state.prompt_variant,
            applied: Vec::new(),
            measured_at: Utc::now(),
        }
    }
}

/// Ordered iteration log. Entries are only ever appended, with strictly
/// increasing iteration numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopHistory {
    /// Identifies one loop session.
    pub session_id: Uuid,
    /// Entries in iteration order.
    pub history: Vec<HistoryEntry>,
    /// Judge score the loop was aiming for.
    pub target: f64,
}

impl LoopHistory {
    /// Empty history aiming for `target`.
    pub fn new(target: f64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            history: Vec::new(),
            target,
        }
    }

    /// Append an entry; its iteration must be larger than the last one.
    pub fn append(&mut self, entry: HistoryEntry) -> Result<(), StoreError> {
        if let Some(last) = self.history.last() {
            if entry.iteration <= last.iteration {
                return Err(StoreError::OutOfOrder {
                    last: last.iteration,
                    attempted: entry.iteration,
                });
            }
        }
        self.history.push(entry);
        Ok(())
    }

    /// Record the strategies applied after the most recent measurement.
    pub fn record_applied(&mut self, applied: Vec<String>) {
        if let Some(last) = self.history.last_mut() {
            last.applied = applied;
        }
    }

    /// Earliest entry.
    pub fn first(&self) -> Option<&HistoryEntry> {
        self.history.first()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    /// Number of measured iterations.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether nothing was measured yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Last-minus-first deltas for F1 and judge.
    pub fn improvement(&self) -> Option<(f64, f64)> {
        let first = self.first()?;
        let last = self.last()?;
        Some((last.f1 - first.f1, last.judge - first.judge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::run::RunConfig;
    use std::collections::BTreeMap;

    fn run(f1: f64, judge: f64) -> RunResult {
        RunResult {
            overall_f1: f1,
            overall_judge: judge,
            elapsed_seconds: 1.0,
            label: String::new(),
            by_category: BTreeMap::new(),
            config: RunConfig::default(),
            not_found_rate: 0.0,
        }
    }

    #[test]
    fn append_rejects_non_increasing_iterations() {
        let state = IterationState::new(0.15, 12, 1000);
        let mut history = LoopHistory::new(13.5);

        history.append(HistoryEntry::new(1, &state, &run(10.0, 5.0))).unwrap();
        history.append(HistoryEntry::new(2, &state, &run(12.0, 7.0))).unwrap();

        let err = history
            .append(HistoryEntry::new(2, &state, &run(0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { last: 2, attempted: 2 }));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn improvement_is_last_minus_first() {
        let state = IterationState::new(0.15, 12, 1000);
        let mut history = LoopHistory::new(13.5);
        assert!(history.improvement().is_none());

        history.append(HistoryEntry::new(1, &state, &run(10.0, 5.0))).unwrap();
        history.append(HistoryEntry::new(2, &state, &run(14.0, 9.5))).unwrap();
        history.record_applied(vec!["lower_threshold".into()]);

        let (df1, djudge) = history.improvement().unwrap();
        assert!((df1 - 4.0).abs() < 1e-9);
        assert!((djudge - 4.5).abs() < 1e-9);
        assert_eq!(history.last().unwrap().applied, vec!["lower_threshold"]);
    }

    #[test]
    fn persisted_shape() {
        let state = IterationState::new(0.15, 12, 1000);
        let mut history = LoopHistory::new(13.5);
        history.append(HistoryEntry::new(1, &state, &run(10.0, 5.0))).unwrap();

        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["target"], 13.5);
        assert_eq!(json["history"][0]["iteration"], 1);
        assert_eq!(json["history"][0]["threshold"], 0.15);
        assert_eq!(json["history"][0]["top_k"], 12);
    }
}
