//! ImprovementLoop - the measure, analyze, mutate, rebuild control loop
//!
//! One control task drives the state machine. Measuring fans out inside the
//! runner; strategy side effects (rebuilds, reindexing) happen strictly
//! between passes, so they never overlap a measurement.

use std::fmt;
use std::sync::Arc;

use super::failure_analyzer::{CategoryGap, FailureAnalyzer};
use super::runner::EvaluationRunner;
use super::strategy::{StrategyCatalog, StrategyContext, StrategyKind, TuningStrategy};
use crate::domain::errors::TuneResult;
use crate::domain::models::{
    HistoryEntry, IterationState, LoopHistory, QaItem, RunConfig, RunResult,
};
use crate::domain::ports::engine::Engine;
use crate::domain::ports::rebuilder::EngineRebuilder;
use crate::domain::ports::store::ResultStore;

/// Phase of the control loop, reported to observers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Run one evaluation pass.
    Measure,
    /// Rank category gaps.
    Analyze,
    /// Apply every strategy whose precondition holds.
    SelectAndApply,
    /// Build the engine with new tuning.
    Rebuild,
    /// Persist the history and finish.
    Stop,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Measure => "measure",
            Self::Analyze => "analyze",
            Self::SelectAndApply => "select_and_apply",
            Self::Rebuild => "rebuild",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The judge score reached the target.
    TargetReached,
    /// The iteration cap was hit.
    MaxIterations,
    /// No strategy took effect in a round.
    NoStrategyApplicable,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetReached => f.write_str("target reached"),
            Self::MaxIterations => f.write_str("max iterations reached"),
            Self::NoStrategyApplicable => f.write_str("no strategy applicable"),
        }
    }
}

/// A strategy that took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStrategy {
    /// Strategy name.
    pub name: &'static str,
    /// Side effect the strategy needed.
    pub kind: StrategyKind,
    /// What changed.
    pub detail: String,
}

impl fmt::Display for AppliedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.detail)
    }
}

/// Hooks for reporting progress while the loop runs. All methods default to
/// doing nothing.
pub trait LoopObserver: Send + Sync {
    /// A phase is starting.
    fn on_phase(&self, _iteration: u32, _phase: LoopPhase) {}

    /// A pass finished.
    fn on_measured(&self, _iteration: u32, _state: &IterationState, _run: &RunResult) {}

    /// Gaps were ranked.
    fn on_analyzed(&self, _iteration: u32, _gaps: &[CategoryGap]) {}

    /// Strategies took effect.
    fn on_applied(&self, _iteration: u32, _applied: &[AppliedStrategy]) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl LoopObserver for SilentObserver {}

/// Fixed inputs of one loop session.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Engine project being tuned.
    pub project: String,
    /// Upper bound on measured iterations.
    pub max_iterations: u32,
    /// Judge score that stops the loop.
    pub target_judge: f64,
}

/// Everything the loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Every measured iteration.
    pub history: LoopHistory,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// State in effect when the loop stopped.
    pub final_state: IterationState,
    /// Last measurement.
    pub last_run: RunResult,
    /// Gaps of the last measurement; empty when the target was reached.
    pub last_gaps: Vec<CategoryGap>,
}

impl LoopOutcome {
    /// Final judge score as a fraction of a reference ceiling judge.
    pub fn judge_efficiency(&self, ceiling_judge: f64) -> Option<f64> {
        (ceiling_judge > 0.0).then(|| self.last_run.overall_judge / ceiling_judge)
    }
}

/// The improvement loop with its collaborators.
pub struct ImprovementLoop {
    runner: EvaluationRunner,
    engine: Arc<dyn Engine>,
    rebuilder: Arc<dyn EngineRebuilder>,
    store: Arc<dyn ResultStore>,
    catalog: StrategyCatalog,
    analyzer: FailureAnalyzer,
    settings: LoopSettings,
    observer: Arc<dyn LoopObserver>,
}

impl ImprovementLoop {
    /// Loop over the given collaborators.
    pub fn new(
        runner: EvaluationRunner,
        engine: Arc<dyn Engine>,
        rebuilder: Arc<dyn EngineRebuilder>,
        store: Arc<dyn ResultStore>,
        catalog: StrategyCatalog,
        analyzer: FailureAnalyzer,
        settings: LoopSettings,
    ) -> Self {
        Self {
            runner,
            engine,
            rebuilder,
            store,
            catalog,
            analyzer,
            settings,
            observer: Arc::new(SilentObserver),
        }
    }

    /// Report progress to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Drive the loop from `initial` until a stop condition holds.
    ///
    /// Runs at most `max_iterations` measurements. Only persistence failures
    /// abort the loop; failed strategies are simply not applied.
    pub async fn run(
        &self,
        items: &[QaItem],
        initial: IterationState,
        base_config: &RunConfig,
    ) -> TuneResult<LoopOutcome> {
        let max_iterations = self.settings.max_iterations.max(1);
        let mut history = LoopHistory::new(self.settings.target_judge);
        let mut state = initial;
        let mut iteration = 1;

        tracing::info!(
            session_id = %history.session_id,
            items = items.len(),
            max_iterations,
            target_judge = self.settings.target_judge,
            "starting improvement loop"
        );

        let (stop_reason, last_run, last_gaps) = loop {
            self.enter(iteration, LoopPhase::Measure);
            let run = self
                .runner
                .run(items, &state, base_config.with_state(&state))
                .await;
            self.store.save_iteration(iteration, &run).await?;
            history.append(HistoryEntry::new(iteration, &state, &run))?;
            self.store.save_history(&history).await?;
            self.observer.on_measured(iteration, &state, &run);

            tracing::info!(
                iteration,
                f1 = run.overall_f1,
                judge = run.overall_judge,
                threshold = state.threshold,
                top_k = state.top_k,
                chunk_size = state.chunk_size,
                "iteration measured"
            );

            if run.overall_judge >= self.settings.target_judge {
                break (StopReason::TargetReached, run, Vec::new());
            }

            self.enter(iteration, LoopPhase::Analyze);
            let gaps = self.analyzer.analyze(&run);
            self.observer.on_analyzed(iteration, &gaps);

            if iteration >= max_iterations {
                break (StopReason::MaxIterations, run, gaps);
            }

            self.enter(iteration, LoopPhase::SelectAndApply);
            let (next, applied) = self.apply_strategies(iteration, state, &run, &gaps).await;
            history.record_applied(applied.iter().map(ToString::to_string).collect());
            self.observer.on_applied(iteration, &applied);

            if applied.is_empty() {
                break (StopReason::NoStrategyApplicable, run, gaps);
            }

            state = next;
            iteration += 1;
        };

        self.enter(iteration, LoopPhase::Stop);
        self.store.save_history(&history).await?;
        tracing::info!(iteration, reason = %stop_reason, "improvement loop stopped");

        Ok(LoopOutcome {
            history,
            stop_reason,
            final_state: state,
            last_run,
            last_gaps,
        })
    }

    fn enter(&self, iteration: u32, phase: LoopPhase) {
        tracing::debug!(iteration, phase = %phase, "loop phase");
        self.observer.on_phase(iteration, phase);
    }

    /// Select and carry out this round's strategies.
    ///
    /// Parameter and rebuild strategies are evaluated in catalog order
    /// against the state built up so far. All structural changes of the round
    /// then go into a single engine rebuild and are kept or dropped together.
    /// Reindex strategies run last, against the state the rebuild left, so a
    /// new chunk size is embedded only once it is active.
    async fn apply_strategies(
        &self,
        iteration: u32,
        state: IterationState,
        run: &RunResult,
        gaps: &[CategoryGap],
    ) -> (IterationState, Vec<AppliedStrategy>) {
        let mut current = state;
        let mut applied = Vec::new();
        let mut structural = Vec::new();

        for strategy in self.catalog.iter() {
            if strategy.kind() == StrategyKind::Reindex {
                continue;
            }
            if !strategy.precondition(&self.context(iteration, &current, run, gaps)) {
                continue;
            }
            let candidate = strategy.apply(&current);
            let entry = AppliedStrategy {
                name: strategy.name(),
                kind: strategy.kind(),
                detail: strategy.describe(&current, &candidate),
            };
            if strategy.kind() == StrategyKind::Rebuild {
                structural.push(entry);
            } else {
                applied.push(entry);
            }
            current = candidate;
        }

        if !structural.is_empty() {
            if self.rebuild(iteration, &current, &structural).await {
                applied.append(&mut structural);
            } else {
                current = IterationState {
                    chunk_size: state.chunk_size,
                    prompt_variant: state.prompt_variant,
                    indexed_chunk_size: state.indexed_chunk_size,
                    ..current
                };
            }
        }

        for strategy in self.catalog.iter().filter(|s| s.kind() == StrategyKind::Reindex) {
            if !strategy.precondition(&self.context(iteration, &current, run, gaps)) {
                continue;
            }
            let candidate = strategy.apply(&current);
            if self.reindex(strategy).await {
                applied.push(AppliedStrategy {
                    name: strategy.name(),
                    kind: strategy.kind(),
                    detail: strategy.describe(&current, &candidate),
                });
                current = candidate;
            }
        }

        (current, applied)
    }

    fn context<'a>(
        &self,
        iteration: u32,
        state: &'a IterationState,
        run: &'a RunResult,
        gaps: &'a [CategoryGap],
    ) -> StrategyContext<'a> {
        StrategyContext {
            iteration,
            state,
            run,
            gaps,
            target_judge: self.settings.target_judge,
        }
    }

    /// One engine rebuild for every structural change of the round. `false`
    /// means none of them are applied.
    async fn rebuild(&self, iteration: u32, target: &IterationState, changes: &[AppliedStrategy]) -> bool {
        self.enter(iteration, LoopPhase::Rebuild);
        let names: Vec<_> = changes.iter().map(|c| c.name).collect();
        match self.rebuilder.rebuild(&target.engine_tuning()).await {
            Ok(()) => {
                tracing::info!(strategies = ?names, "engine rebuilt");
                true
            }
            Err(e) => {
                tracing::warn!(strategies = ?names, error = %e, "rebuild failed, structural changes not applied");
                false
            }
        }
    }

    async fn reindex(&self, strategy: &dyn TuningStrategy) -> bool {
        match self.engine.embed(&self.settings.project).await {
            Ok(summary) => {
                tracing::info!(
                    strategy = strategy.name(),
                    total_chunks = ?summary.total_chunks,
                    "index rebuilt"
                );
                true
            }
            Err(e) => {
                tracing::warn!(strategy = strategy.name(), error = %e, "reindex failed, strategy not applied");
                false
            }
        }
    }
}
