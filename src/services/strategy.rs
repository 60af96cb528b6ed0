//! Tuning strategies and the fixed catalog the loop draws from.

use std::fmt;

use super::failure_analyzer::CategoryGap;
use crate::domain::models::config::StrategyConfig;
use crate::domain::models::{IterationState, PromptVariant, RunResult};

/// Side effect that must accompany a strategy's state transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Takes effect on the next `ask`; nothing else to do.
    Parameter,
    /// New engine tuning must be written and the engine rebuilt.
    Rebuild,
    /// The project's embedding index must be rebuilt.
    Reindex,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => f.write_str("parameter"),
            Self::Rebuild => f.write_str("rebuild"),
            Self::Reindex => f.write_str("reindex"),
        }
    }
}

/// What a precondition may look at.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Iteration that was just measured (1-based).
    pub iteration: u32,
    /// State with every earlier strategy of this round already applied.
    /// Reindex strategies see the state left by the round's rebuild.
    pub state: &'a IterationState,
    /// Measurement the round reacts to.
    pub run: &'a RunResult,
    /// Ranked category gaps of that measurement.
    pub gaps: &'a [CategoryGap],
    /// Judge score the loop is aiming for.
    pub target_judge: f64,
}

/// One way of changing the tuning between iterations.
pub trait TuningStrategy: Send + Sync {
    /// Stable name used in history and logs.
    fn name(&self) -> &'static str;

    /// Side effect the change needs.
    fn kind(&self) -> StrategyKind;

    /// Whether the strategy applies this round.
    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool;

    /// Pure transform of the state.
    fn apply(&self, state: &IterationState) -> IterationState;

    /// Short human-readable account of the change.
    fn describe(&self, before: &IterationState, after: &IterationState) -> String;
}

/// Thresholds are kept to a few decimals so repeated steps don't drift.
fn round_threshold(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Lowers the similarity threshold by a step, down to a floor.
pub struct LowerThreshold {
    /// Lowest threshold.
    pub floor: f64,
    /// Decrement.
    pub step: f64,
}

impl TuningStrategy for LowerThreshold {
    fn name(&self) -> &'static str {
        "lower_threshold"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Parameter
    }

    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool {
        round_threshold(ctx.state.threshold) > round_threshold(self.floor)
    }

    fn apply(&self, state: &IterationState) -> IterationState {
        state.with_threshold(round_threshold((state.threshold - self.step).max(self.floor)))
    }

    fn describe(&self, before: &IterationState, after: &IterationState) -> String {
        format!("threshold {} -> {}", before.threshold, after.threshold)
    }
}

/// Raises top-k while the judge score is well short of target.
pub struct RaiseTopK {
    /// Increment.
    pub step: u32,
    /// Largest top-k.
    pub ceiling: u32,
    /// Applies while judge < target times this.
    pub target_ratio: f64,
}

impl TuningStrategy for RaiseTopK {
    fn name(&self) -> &'static str {
        "raise_top_k"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Parameter
    }

    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool {
        ctx.state.top_k < self.ceiling && ctx.run.overall_judge < ctx.target_judge * self.target_ratio
    }

    fn apply(&self, state: &IterationState) -> IterationState {
        state.with_top_k(state.top_k.saturating_add(self.step).min(self.ceiling))
    }

    fn describe(&self, before: &IterationState, after: &IterationState) -> String {
        format!("top_k {} -> {}", before.top_k, after.top_k)
    }
}

/// Switches the engine to smaller chunks once, at a set iteration.
pub struct ReduceChunkSize {
    /// Iteration after which it applies.
    pub at_iteration: u32,
    /// Chunk size it replaces.
    pub from: u32,
    /// Chunk size it sets.
    pub to: u32,
}

impl TuningStrategy for ReduceChunkSize {
    fn name(&self) -> &'static str {
        "reduce_chunk_size"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Rebuild
    }

    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool {
        ctx.iteration == self.at_iteration && ctx.state.chunk_size == self.from
    }

    fn apply(&self, state: &IterationState) -> IterationState {
        state.with_chunk_size(self.to)
    }

    fn describe(&self, before: &IterationState, after: &IterationState) -> String {
        format!("chunk_size {} -> {}", before.chunk_size, after.chunk_size)
    }
}

/// Re-embeds the project periodically or when the index is stale.
pub struct RebuildIndex {
    /// Reindex on every iteration divisible by this.
    pub every: u32,
}

impl TuningStrategy for RebuildIndex {
    fn name(&self) -> &'static str {
        "rebuild_index"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Reindex
    }

    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool {
        ctx.iteration % self.every == 0 || ctx.state.index_is_stale()
    }

    fn apply(&self, state: &IterationState) -> IterationState {
        state.reindexed()
    }

    fn describe(&self, _before: &IterationState, after: &IterationState) -> String {
        format!("reindex at chunk_size {}", after.indexed_chunk_size)
    }
}

/// Adds per-category answering guidance to the prompt once.
pub struct ReviseSynthesisPrompt {
    /// Iteration after which it applies.
    pub at_iteration: u32,
}

impl TuningStrategy for ReviseSynthesisPrompt {
    fn name(&self) -> &'static str {
        "revise_synthesis_prompt"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Rebuild
    }

    fn precondition(&self, ctx: &StrategyContext<'_>) -> bool {
        ctx.iteration == self.at_iteration && !ctx.state.prompt_variant.has_category_guidance()
    }

    fn apply(&self, state: &IterationState) -> IterationState {
        state.with_prompt_variant(PromptVariant::CategoryGuidance)
    }

    fn describe(&self, before: &IterationState, after: &IterationState) -> String {
        format!("prompt {} -> {}", before.prompt_variant, after.prompt_variant)
    }
}

/// Ordered strategy set. Order is significant: later preconditions see the
/// state produced by earlier strategies.
pub struct StrategyCatalog {
    strategies: Vec<Box<dyn TuningStrategy>>,
}

impl StrategyCatalog {
    /// Catalog evaluated in the given order.
    pub fn new(strategies: Vec<Box<dyn TuningStrategy>>) -> Self {
        Self { strategies }
    }

    /// The five built-in strategies in their fixed order.
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(vec![
            Box::new(LowerThreshold {
                floor: config.threshold_floor,
                step: config.threshold_step,
            }),
            Box::new(RaiseTopK {
                step: config.top_k_step,
                ceiling: config.top_k_ceiling,
                target_ratio: config.top_k_target_ratio,
            }),
            Box::new(ReduceChunkSize {
                at_iteration: config.chunk_iteration,
                from: config.chunk_size_from,
                to: config.chunk_size_to,
            }),
            Box::new(RebuildIndex {
                every: config.reindex_every.max(1),
            }),
            Box::new(ReviseSynthesisPrompt {
                at_iteration: config.prompt_iteration,
            }),
        ])
    }

    /// Strategies in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn TuningStrategy> {
        self.strategies.iter().map(AsRef::as_ref)
    }

    /// Strategy names in evaluation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(TuningStrategy::name).collect()
    }

    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the catalog has no strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunConfig;
    use std::collections::BTreeMap;

    fn run(judge: f64) -> RunResult {
        RunResult {
            overall_f1: 40.0,
            overall_judge: judge,
            elapsed_seconds: 0.0,
            label: String::new(),
            by_category: BTreeMap::new(),
            config: RunConfig::default(),
            not_found_rate: 0.0,
        }
    }

    fn ctx<'a>(iteration: u32, state: &'a IterationState, run: &'a RunResult) -> StrategyContext<'a> {
        StrategyContext {
            iteration,
            state,
            run,
            gaps: &[],
            target_judge: 13.5,
        }
    }

    #[test]
    fn test_catalog_order() {
        let catalog = StrategyCatalog::from_config(&StrategyConfig::default());
        assert_eq!(
            catalog.names(),
            vec![
                "lower_threshold",
                "raise_top_k",
                "reduce_chunk_size",
                "rebuild_index",
                "revise_synthesis_prompt"
            ]
        );
    }

    #[test]
    fn test_lower_threshold_clamps_to_floor() {
        let s = LowerThreshold { floor: 0.05, step: 0.03 };
        let r = run(0.0);

        let mut state = IterationState::new(0.15, 12, 1000);
        let mut seen = vec![];
        while s.precondition(&ctx(1, &state, &r)) {
            state = s.apply(&state);
            seen.push(state.threshold);
        }
        assert_eq!(seen, vec![0.12, 0.09, 0.06, 0.05]);
    }

    #[test]
    fn test_raise_top_k_requires_low_judge() {
        let s = RaiseTopK {
            step: 4,
            ceiling: 24,
            target_ratio: 0.9,
        };
        let state = IterationState::new(0.15, 22, 1000);

        let low = run(10.0);
        assert!(s.precondition(&ctx(1, &state, &low)));
        assert_eq!(s.apply(&state).top_k, 24);

        // above target * 0.9 = 12.15
        let near = run(12.5);
        assert!(!s.precondition(&ctx(1, &state, &near)));

        let full = IterationState::new(0.15, 24, 1000);
        assert!(!s.precondition(&ctx(1, &full, &low)));
    }

    #[test]
    fn test_reduce_chunk_size_is_idempotent() {
        let s = ReduceChunkSize {
            at_iteration: 2,
            from: 1000,
            to: 500,
        };
        let r = run(0.0);
        let state = IterationState::new(0.15, 12, 1000);

        assert!(!s.precondition(&ctx(1, &state, &r)));
        assert!(s.precondition(&ctx(2, &state, &r)));

        let reduced = s.apply(&state);
        assert_eq!(reduced.chunk_size, 500);
        assert!(!s.precondition(&ctx(2, &reduced, &r)));
    }

    #[test]
    fn test_rebuild_index_on_schedule_or_stale() {
        let s = RebuildIndex { every: 2 };
        let r = run(0.0);
        let fresh = IterationState::new(0.15, 12, 1000);
        let stale = fresh.with_chunk_size(500);

        assert!(!s.precondition(&ctx(1, &fresh, &r)));
        assert!(s.precondition(&ctx(2, &fresh, &r)));
        assert!(s.precondition(&ctx(3, &stale, &r)));
        assert!(!s.apply(&stale).index_is_stale());
    }

    #[test]
    fn test_prompt_revision_applies_once() {
        let s = ReviseSynthesisPrompt { at_iteration: 2 };
        let r = run(0.0);
        let state = IterationState::new(0.15, 12, 1000);

        assert!(s.precondition(&ctx(2, &state, &r)));
        let revised = s.apply(&state);
        assert_eq!(revised.prompt_variant, PromptVariant::CategoryGuidance);
        assert!(!s.precondition(&ctx(2, &revised, &r)));
        assert_eq!(s.describe(&state, &revised), "prompt baseline -> category_guidance");
    }
}
