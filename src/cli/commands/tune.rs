//! Implementation of the `ragtune loop` command.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{completion_client, load_items, parse_categories, require_engine};
use crate::cli::output::progress::pass_progress;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, IterationState, LoopHistory, RunConfig, RunMode, RunResult};
use crate::domain::ports::{Engine, EngineRebuilder};
use crate::infrastructure::rebuild::TuningFileRebuilder;
use crate::infrastructure::storage::{load_run, JsonStore, HISTORY_FILE};
use crate::services::{
    AppliedStrategy, CategoryGap, EvaluationRunner, FailureAnalyzer, ImprovementLoop, LlmJudge,
    LoopObserver, LoopSettings, Predictor, StrategyCatalog,
};

/// Arguments for `ragtune loop`.
#[derive(Args, Debug)]
pub struct LoopArgs {
    /// Gold QA dataset (defaults to eval.dataset)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Engine project to query
    #[arg(short, long)]
    pub project: Option<String>,

    /// Categories to evaluate (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Cap on items per category
    #[arg(long = "max-per-cat")]
    pub max_per_category: Option<usize>,

    /// Maximum number of measured iterations
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Judge score that ends the loop
    #[arg(long)]
    pub target_judge: Option<f64>,

    /// Starting similarity threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Starting candidate count
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Previous result shown as the starting point
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Full-context result used for the final efficiency figure
    #[arg(long)]
    pub ceiling_result: Option<PathBuf>,

    /// Directory for per-iteration results and the loop history
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Ask with knowledge-graph expansion
    #[arg(long)]
    pub use_graph: bool,

    /// Worker pool size
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Prints iteration reports as the loop progresses.
struct ConsoleObserver {
    formatter: TableFormatter,
    ceiling_f1: f64,
    prev: Mutex<Option<RunResult>>,
}

impl ConsoleObserver {
    fn new(ceiling_f1: f64, baseline: Option<RunResult>) -> Self {
        Self {
            formatter: TableFormatter::new(),
            ceiling_f1,
            prev: Mutex::new(baseline),
        }
    }
}

impl LoopObserver for ConsoleObserver {
    fn on_measured(&self, iteration: u32, state: &IterationState, run: &RunResult) {
        let Ok(mut prev) = self.prev.lock() else {
            return;
        };
        println!(
            "\nIteration {iteration}  (threshold={} top_k={} chunk_size={} prompt={})",
            state.threshold, state.top_k, state.chunk_size, state.prompt_variant
        );
        println!("{}", self.formatter.format_category_report(run, prev.as_ref()));
        *prev = Some(run.clone());
    }

    fn on_analyzed(&self, _iteration: u32, gaps: &[CategoryGap]) {
        println!("{}", self.formatter.format_gaps(gaps, self.ceiling_f1));
    }

    fn on_applied(&self, _iteration: u32, applied: &[AppliedStrategy]) {
        if applied.is_empty() {
            println!("No strategy applicable.");
            return;
        }
        println!("Applied:");
        for strategy in applied {
            println!("  - {strategy} [{}]", strategy.kind);
        }
    }
}

/// Summary of a finished improvement loop.
#[derive(Debug, Serialize)]
pub struct LoopOutput {
    /// Why the loop stopped.
    pub stop_reason: String,
    /// Every measured iteration.
    pub history: LoopHistory,
    /// Tuning in effect when the loop stopped.
    pub final_state: IterationState,
    /// F1 of the last measurement.
    pub final_f1: f64,
    /// Judge score of the last measurement.
    pub final_judge: f64,
    /// Last-minus-first `(f1, judge)`.
    pub improvement: Option<(f64, f64)>,
    /// Reference ceiling judge score.
    pub ceiling_judge: f64,
    /// Final judge score over the ceiling.
    pub judge_efficiency: Option<f64>,
    /// Category gaps left after the last measurement.
    pub remaining_gaps: Vec<CategoryGap>,
    /// Where the history was written.
    pub history_file: PathBuf,
}

impl CommandOutput for LoopOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            String::new(),
            format!("Loop finished after {} iteration(s): {}", self.history.len(), self.stop_reason),
            TableFormatter::new().format_history(&self.history),
            format!("Final: F1={:.1}  judge={:.1}", self.final_f1, self.final_judge),
        ];
        if let Some((f1, judge)) = self.improvement {
            lines.push(format!("Improvement: {f1:+.1} F1  {judge:+.1} judge"));
        }
        if let Some(efficiency) = self.judge_efficiency {
            lines.push(format!(
                "Judge efficiency: {:.0}% of ceiling ({:.1})",
                efficiency * 100.0,
                self.ceiling_judge
            ));
        }
        lines.push(format!("History -> {}", self.history_file.display()));
        lines.join("\n")
    }
}

/// Run the improvement loop.
pub async fn execute(args: LoopArgs, config: &Config, json_mode: bool) -> Result<()> {
    let tuning = &config.tuning;
    let project = args.project.clone().unwrap_or_else(|| config.engine.project.clone());
    let categories = parse_categories(&args.categories, &config.eval.categories)?;
    let max_per_category = args.max_per_category.or(config.eval.max_per_category);
    let dataset = args.dataset.clone().unwrap_or_else(|| config.eval.dataset.clone());
    let items = load_items(&dataset, &categories, max_per_category)?;

    let engine: Arc<dyn Engine> = require_engine(&config.engine, None)?;
    let client = completion_client(&config.llm, "the improvement loop judge")?;
    let judge = LlmJudge::new(
        client,
        config.llm.judge_model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    );

    let rebuilder = Arc::new(TuningFileRebuilder::new(
        config.engine.tuning_file.clone(),
        config.engine.build.clone(),
    ));
    let output_dir = args.output_dir.clone().unwrap_or_else(|| config.eval.output_dir.clone());
    let store = Arc::new(JsonStore::new(output_dir.clone()));

    let mut initial = IterationState::new(
        args.threshold.unwrap_or(tuning.threshold),
        args.top_k.unwrap_or(tuning.top_k),
        tuning.chunk_size,
    );
    if let Some(active) = rebuilder.current().await? {
        tracing::info!(
            chunk_size = active.chunk_size,
            prompt_variant = %active.prompt_variant,
            "resuming from active engine tuning"
        );
        initial = initial
            .with_chunk_size(active.chunk_size)
            .with_prompt_variant(active.prompt_variant)
            .reindexed();
    }

    let baseline = match args.baseline.as_ref().or(tuning.baseline.as_ref()) {
        Some(path) => {
            let run = load_run(path)
                .await
                .with_context(|| format!("Failed to load baseline {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                f1 = run.overall_f1,
                judge = run.overall_judge,
                "baseline loaded"
            );
            Some(run)
        }
        None => None,
    };
    let ceiling_run = match &args.ceiling_result {
        Some(path) => Some(
            load_run(path)
                .await
                .with_context(|| format!("Failed to load ceiling result {}", path.display()))?,
        ),
        None => None,
    };
    let ceiling_judge = ceiling_run
        .as_ref()
        .or_else(|| baseline.as_ref().filter(|b| b.is_ceiling()))
        .map_or(tuning.ceiling_judge, |run| run.overall_judge);

    let use_graph = args.use_graph || config.engine.use_graph;
    let concurrency = args.workers.unwrap_or(config.eval.concurrency);
    let base_config = RunConfig {
        mode: RunMode::Retrieval,
        project: project.clone(),
        use_graph,
        concise: config.engine.concise,
        engine_model: config.engine.model.clone(),
        judge_model: Some(judge.model().to_string()),
        categories,
        max_per_category,
        concurrency,
        ..RunConfig::default()
    };

    let runner = EvaluationRunner::new(
        Predictor::Retrieval {
            engine: Arc::clone(&engine),
            project: project.clone(),
            use_graph,
            concise: config.engine.concise,
        },
        concurrency,
        Duration::from_secs(config.eval.item_timeout_secs),
    )
    .with_judge(Some(judge))
    .with_progress(pass_progress(json_mode, "measuring"));

    let settings = LoopSettings {
        project,
        max_iterations: args.max_iterations.unwrap_or(tuning.max_iterations),
        target_judge: args.target_judge.unwrap_or(tuning.target_judge),
    };

    let mut improvement_loop = ImprovementLoop::new(
        runner,
        engine,
        rebuilder,
        store,
        StrategyCatalog::from_config(&tuning.strategies),
        FailureAnalyzer::new(tuning.ceiling_f1),
        settings,
    );
    if !json_mode {
        improvement_loop =
            improvement_loop.with_observer(Arc::new(ConsoleObserver::new(tuning.ceiling_f1, baseline)));
    }

    let outcome = improvement_loop.run(&items, initial, &base_config).await?;

    let judge_efficiency = outcome.judge_efficiency(ceiling_judge);
    output(
        &LoopOutput {
            stop_reason: outcome.stop_reason.to_string(),
            improvement: outcome.history.improvement(),
            final_f1: outcome.last_run.overall_f1,
            final_judge: outcome.last_run.overall_judge,
            final_state: outcome.final_state,
            remaining_gaps: outcome.last_gaps,
            history: outcome.history,
            ceiling_judge,
            judge_efficiency,
            history_file: output_dir.join(HISTORY_FILE),
        },
        json_mode,
    );
    Ok(())
}
