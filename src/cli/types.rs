//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::bench::BenchArgs;
use super::commands::compare::CompareArgs;
use super::commands::eval::EvalArgs;
use super::commands::tune::LoopArgs;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "ragtune")]
#[command(about = "ragtune - feedback-driven tuning for a retrieval QA engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Extra config file, layered above .ragtune/config.yaml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one evaluation pass over the gold QA dataset
    Eval(EvalArgs),

    /// Run the measure, analyze, mutate, rebuild improvement loop
    #[command(name = "loop")]
    Loop(LoopArgs),

    /// Benchmark conversational memory on a multi-session dataset
    Bench(BenchArgs),

    /// Compare persisted run results
    Compare(CompareArgs),
}
