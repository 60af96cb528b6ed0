//! Domain models for the tuning harness.

pub mod config;
pub mod history;
pub mod iteration;
pub mod qa;
pub mod run;

pub use config::{
    BuildConfig, Config, EngineConfig, EngineTimeouts, EvalConfig, LlmConfig, LogFormat,
    LoggingConfig, RateLimitConfig, RetryConfig, RotationPolicy, StrategyConfig, TuningConfig,
};
pub use history::{HistoryEntry, LoopHistory};
pub use iteration::{EngineTuning, IterationState, PromptVariant};
pub use qa::{
    Category, Conversation, ConversationDataset, ConversationQa, QaDataset, QaItem, QuestionType,
    Turn,
};
pub use run::{
    aggregate, percent_mean, Aggregate, CategoryStats, ItemOutcome, PredictionResult,
    RetrievalEfficiency, RunConfig, RunMode, RunResult, RunSummary, ScoreRecord,
};
