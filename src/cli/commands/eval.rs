//! Implementation of the `ragtune eval` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{completion_client, load_items, parse_categories, require_engine};
use crate::cli::output::progress::pass_progress;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, IterationState, RunConfig, RunMode, RunResult};
use crate::infrastructure::storage::{load_run, write_json};
use crate::services::{load_corpus, CeilingAnswerer, EvaluationRunner, LlmJudge, Predictor};

const DEFAULT_OUTPUT_FILE: &str = "domain_results.json";

/// Arguments for `ragtune eval`.
#[derive(Args, Debug)]
pub struct EvalArgs {
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

    /// Answer from the whole knowledge corpus instead of retrieval
    #[arg(long, visible_alias = "ceiling")]
    pub full_context: bool,

    /// Previous result file for per-category deltas
    #[arg(long)]
    pub prev: Option<PathBuf>,

    /// Where to write the result (defaults to <output_dir>/domain_results.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Retrieval similarity threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Retrieval candidate count
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Engine answering model override
    #[arg(long)]
    pub model: Option<String>,

    /// Judge model override
    #[arg(long)]
    pub judge_model: Option<String>,

    /// Ask with knowledge-graph expansion
    #[arg(long)]
    pub use_graph: bool,

    /// Skip the LLM judge
    #[arg(long)]
    pub no_judge: bool,

    /// Worker pool size
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// One evaluation pass and where it was written.
#[derive(Debug, Serialize)]
pub struct EvalOutput {
    /// Result file.
    pub output: PathBuf,
    /// Scores of this pass.
    #[serde(flatten)]
    pub run: RunResult,
    /// Earlier run to report deltas against.
    #[serde(skip)]
    pub prev: Option<RunResult>,
}

impl CommandOutput for EvalOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut sections = vec![formatter.format_category_report(&self.run, self.prev.as_ref())];
        if let Some(prev) = self.prev.as_ref().filter(|p| p.is_ceiling() && !self.run.is_ceiling()) {
            sections.push(formatter.format_efficiency(&self.run, prev));
        }
        sections.push(format!("Results -> {}", self.output.display()));
        sections.join("\n\n")
    }
}

/// Run one evaluation pass and persist it.
pub async fn execute(args: EvalArgs, config: &Config, json_mode: bool) -> Result<()> {
    let project = args.project.clone().unwrap_or_else(|| config.engine.project.clone());
    let categories = parse_categories(&args.categories, &config.eval.categories)?;
    let max_per_category = args.max_per_category.or(config.eval.max_per_category);
    let dataset = args.dataset.clone().unwrap_or_else(|| config.eval.dataset.clone());
    let items = load_items(&dataset, &categories, max_per_category)?;

    let use_judge = config.eval.use_judge && !args.no_judge;
    let judge_model = args.judge_model.clone().unwrap_or_else(|| config.llm.judge_model.clone());
    let engine_model = args.model.clone().or_else(|| config.engine.model.clone());

    let client = if use_judge || args.full_context {
        let purpose = if args.full_context { "--full-context" } else { "the LLM judge" };
        Some(completion_client(&config.llm, purpose)?)
    } else {
        None
    };

    let predictor = match (&client, args.full_context) {
        (Some(client), true) => {
            let knowledge_dir = config.eval.resolve_knowledge_dir();
            let corpus = load_corpus(&knowledge_dir, &project)
                .with_context(|| format!("Failed to read knowledge under {}", knowledge_dir.display()))?;
            if corpus.is_empty() {
                anyhow::bail!("No knowledge files for project {project} in {}", knowledge_dir.display());
            }
            let answerer = CeilingAnswerer::new(
                Arc::clone(client),
                config.llm.ceiling_model.clone(),
                &corpus,
                Duration::from_secs(config.llm.ceiling_timeout_secs),
            );
            tracing::info!(
                corpus_chars = answerer.corpus_chars(),
                model = answerer.model(),
                "full-context corpus loaded"
            );
            Predictor::Ceiling(answerer)
        }
        _ => Predictor::Retrieval {
            engine: require_engine(&config.engine, engine_model.clone())?,
            project: project.clone(),
            use_graph: args.use_graph || config.engine.use_graph,
            concise: config.engine.concise,
        },
    };

    let judge = client
        .filter(|_| use_judge)
        .map(|client| LlmJudge::new(client, judge_model.clone(), Duration::from_secs(config.llm.timeout_secs)));

    let state = IterationState::new(
        args.threshold.unwrap_or(config.tuning.threshold),
        args.top_k.unwrap_or(config.tuning.top_k),
        config.tuning.chunk_size,
    );
    let concurrency = args.workers.unwrap_or(config.eval.concurrency);
    let run_config = RunConfig {
        mode: if args.full_context { RunMode::Ceiling } else { RunMode::Retrieval },
        project,
        use_graph: args.use_graph || config.engine.use_graph,
        concise: config.engine.concise,
        engine_model,
        judge_model: use_judge.then_some(judge_model),
        ceiling_model: args.full_context.then(|| config.llm.ceiling_model.clone()),
        categories,
        max_per_category,
        concurrency,
        ..RunConfig::default()
    }
    .with_state(&state);

    let prev = match &args.prev {
        Some(path) => Some(
            load_run(path)
                .await
                .with_context(|| format!("Failed to load previous result {}", path.display()))?,
        ),
        None => None,
    };

    let runner = EvaluationRunner::new(
        predictor,
        concurrency,
        Duration::from_secs(config.eval.item_timeout_secs),
    )
    .with_judge(judge)
    .with_progress(pass_progress(json_mode, run_config.label()));

    let run = runner.run(&items, &state, run_config).await;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| config.eval.output_dir.join(DEFAULT_OUTPUT_FILE));
    write_json(&output_path, &run).await?;

    output(
        &EvalOutput {
            output: output_path,
            run,
            prev,
        },
        json_mode,
    );
    Ok(())
}
