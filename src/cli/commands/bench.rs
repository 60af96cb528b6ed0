//! Implementation of the `ragtune bench` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::require_engine;
use crate::cli::output::progress::spinner;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{CategoryStats, Config, IterationState, QuestionType};
use crate::infrastructure::storage::load_conversations;
use crate::services::conversation_bench::BASELINES;
use crate::services::{BenchReport, ConversationBench};

/// Arguments for `ragtune bench`.
#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Conversation dataset (JSON)
    #[arg(default_value = "eval/locomo_dataset.json")]
    pub dataset: PathBuf,

    /// Conversations evaluated in parallel
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Build and use the knowledge graph
    #[arg(long)]
    pub use_graph: bool,

    /// Only evaluate the first N conversations
    #[arg(long)]
    pub max_conversations: Option<usize>,

    /// Retrieval similarity threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Retrieval candidate count
    #[arg(long)]
    pub top_k: Option<u32>,
}

/// Benchmark report as printed or emitted as JSON.
#[derive(Debug, Serialize)]
pub struct BenchOutput {
    /// Mean token F1 over every question, in percent.
    pub overall_f1: f64,
    /// Scores per question type.
    pub by_type: BTreeMap<QuestionType, CategoryStats>,
    /// Conversations evaluated.
    pub conversations: usize,
    /// Questions asked.
    pub questions: usize,
    /// Share of empty answers, in percent.
    pub not_found_rate: f64,
    /// Wall time in seconds.
    pub elapsed: f64,
    /// Published F1 baselines for comparison.
    pub baselines: BTreeMap<String, f64>,
    #[serde(skip)]
    report: BenchReport,
}

impl From<BenchReport> for BenchOutput {
    fn from(report: BenchReport) -> Self {
        Self {
            overall_f1: report.overall_f1,
            by_type: report.by_type.clone(),
            conversations: report.conversations,
            questions: report.questions,
            not_found_rate: report.not_found_rate,
            elapsed: report.elapsed.as_secs_f64(),
            baselines: BASELINES.iter().map(|(name, f1)| ((*name).to_string(), *f1)).collect(),
            report,
        }
    }
}

impl CommandOutput for BenchOutput {
    fn to_human(&self) -> String {
        TableFormatter::new().format_bench(&self.report)
    }
}

/// Run the conversation benchmark.
pub async fn execute(args: BenchArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut dataset = load_conversations(&args.dataset)?;
    if let Some(max) = args.max_conversations {
        dataset.conversations.truncate(max);
    }
    if dataset.conversations.is_empty() {
        anyhow::bail!("No conversations in {}", args.dataset.display());
    }

    let engine = require_engine(&config.engine, None)?;
    let state = IterationState::new(
        args.threshold.unwrap_or(config.tuning.threshold),
        args.top_k.unwrap_or(config.tuning.top_k),
        config.tuning.chunk_size,
    );
    let workers = args.workers.unwrap_or(config.eval.concurrency);

    tracing::info!(
        dataset = %args.dataset.display(),
        conversations = dataset.conversations.len(),
        workers,
        "starting conversation benchmark"
    );

    let progress = spinner(
        json_mode,
        format!("benchmarking {} conversations", dataset.conversations.len()),
    );
    let report = ConversationBench::new(engine, state, workers)
        .with_graph(args.use_graph || config.engine.use_graph)
        .with_concise(config.engine.concise)
        .run(&dataset.conversations)
        .await;
    progress.finish_and_clear();

    output(&BenchOutput::from(report), json_mode);
    Ok(())
}
