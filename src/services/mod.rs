//! Application services: scoring, evaluation passes, analysis and the improvement loop.

pub mod ceiling;
pub mod conversation_bench;
pub mod failure_analyzer;
pub mod judge;
pub mod orchestrator;
pub mod runner;
pub mod scorer;
pub mod strategy;

pub use ceiling::{load_corpus, CeilingAnswerer};
pub use conversation_bench::{BenchReport, ConversationBench};
pub use failure_analyzer::{CategoryGap, FailureAnalyzer};
pub use judge::LlmJudge;
pub use orchestrator::{
    AppliedStrategy, ImprovementLoop, LoopObserver, LoopOutcome, LoopPhase, LoopSettings,
    SilentObserver, StopReason,
};
pub use runner::{EvaluationRunner, Predictor};
pub use scorer::{normalize_answer, token_f1};
pub use strategy::{StrategyCatalog, StrategyContext, StrategyKind, TuningStrategy};
