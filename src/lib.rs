//! ragtune - feedback-driven tuning for a retrieval QA engine
//!
//! ragtune drives an opaque retrieval/answering engine as a subprocess,
//! scores its answers against a gold QA dataset (token F1 plus an optional LLM
//! judge), and runs an improvement loop that measures, analyzes per-category
//! gaps, applies tuning strategies and rebuilds the engine until a target
//! judge score or an iteration cap is reached.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports the services
//!   depend on
//! - **Service Layer** (`services`): scoring, evaluation passes, gap analysis,
//!   strategies and the improvement loop
//! - **Infrastructure Layer** (`infrastructure`): the engine subprocess, the
//!   remote LLM client, the rebuild step, JSON persistence, config and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{TuneError, TuneResult};
pub use domain::models::{
    Category, Config, IterationState, LoggingConfig, LoopHistory, QaItem, RunConfig, RunResult,
};
pub use domain::ports::{CompletionClient, Engine, EngineRebuilder, ResultStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    normalize_answer, token_f1, EvaluationRunner, FailureAnalyzer, ImprovementLoop, StrategyCatalog,
};
