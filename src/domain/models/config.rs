//! Configuration model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::qa::Category;

/// Main configuration structure for ragtune
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// External engine invocation
    #[serde(default)]
    pub engine: EngineConfig,

    /// Remote LLM used for judging and ceiling answers
    #[serde(default)]
    pub llm: LlmConfig,

    /// Evaluation pass settings
    #[serde(default)]
    pub eval: EvalConfig,

    /// Improvement loop settings
    #[serde(default)]
    pub tuning: TuningConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Path to the engine binary
    #[serde(default = "default_engine_binary")]
    pub binary: PathBuf,

    /// Knowledge project (namespace) to evaluate against
    #[serde(default = "default_project")]
    pub project: String,

    /// Embedding provider passed to `embed`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model override for `ask`, exported through `model_env_var`
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_model_env_var")]
    pub model_env_var: String,

    /// Declarative tuning file the engine reads at startup
    #[serde(default = "default_tuning_file")]
    pub tuning_file: PathBuf,

    /// Environment variable that tells the engine where the tuning file is
    #[serde(default = "default_tuning_env_var")]
    pub tuning_env_var: String,

    /// Ask for short answers (`--concise`)
    #[serde(default = "default_true")]
    pub concise: bool,

    /// Graph-augmented retrieval (`--use-graph`)
    #[serde(default)]
    pub use_graph: bool,

    /// Per-command timeouts
    #[serde(default)]
    pub timeouts: EngineTimeouts,

    /// Build step run after the tuning file changes
    #[serde(default)]
    pub build: BuildConfig,
}

fn default_engine_binary() -> PathBuf {
    PathBuf::from("./target/release/engram")
}

fn default_project() -> String {
    "Personal".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model_env_var() -> String {
    "ENGRAM_LLM_MODEL".to_string()
}

fn default_tuning_file() -> PathBuf {
    PathBuf::from(".ragtune/engine-tuning.json")
}

fn default_tuning_env_var() -> String {
    "ENGRAM_TUNING_FILE".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            project: default_project(),
            provider: default_provider(),
            model: None,
            model_env_var: default_model_env_var(),
            tuning_file: default_tuning_file(),
            tuning_env_var: default_tuning_env_var(),
            concise: true,
            use_graph: false,
            timeouts: EngineTimeouts::default(),
            build: BuildConfig::default(),
        }
    }
}

/// Per-operation engine timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineTimeouts {
    /// `ask`
    #[serde(default = "default_ask_secs")]
    pub ask_secs: u64,

    /// `add`
    #[serde(default = "default_add_secs")]
    pub add_secs: u64,

    /// `embed`
    #[serde(default = "default_embed_secs")]
    pub embed_secs: u64,

    /// `graph build`
    #[serde(default = "default_graph_secs")]
    pub graph_secs: u64,

    /// `forget`
    #[serde(default = "default_forget_secs")]
    pub forget_secs: u64,
}

const fn default_ask_secs() -> u64 {
    30
}

const fn default_add_secs() -> u64 {
    60
}

const fn default_embed_secs() -> u64 {
    300
}

const fn default_graph_secs() -> u64 {
    120
}

const fn default_forget_secs() -> u64 {
    60
}

impl Default for EngineTimeouts {
    fn default() -> Self {
        Self {
            ask_secs: default_ask_secs(),
            add_secs: default_add_secs(),
            embed_secs: default_embed_secs(),
            graph_secs: default_graph_secs(),
            forget_secs: default_forget_secs(),
        }
    }
}

/// Build step configuration. An empty command means the engine picks up the
/// tuning file without rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    /// Program followed by its arguments, e.g. `["cargo", "build", "--release"]`
    #[serde(default)]
    pub command: Vec<String>,

    /// Directory the build runs in
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Build time limit
    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_build_timeout_secs() -> u64 {
    300
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            timeout_secs: default_build_timeout_secs(),
        }
    }
}

/// Remote LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// API key; falls back to the `api_key_env` environment variable
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for YES/NO judging
    #[serde(default = "default_llm_model")]
    pub judge_model: String,

    /// Model used for full-context answers
    #[serde(default = "default_llm_model")]
    pub ceiling_model: String,

    /// Timeout for judge calls
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for full-context ceiling calls
    #[serde(default = "default_ceiling_timeout_secs")]
    pub ceiling_timeout_secs: u64,

    /// Client-side request rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Backoff for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    30
}

const fn default_ceiling_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            judge_model: default_llm_model(),
            ceiling_model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
            ceiling_timeout_secs: default_ceiling_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Configured key, or the environment variable named by `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

const fn default_requests_per_second() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Retry policy configuration for transient LLM failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Give up retrying after this long; 0 disables retries
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    8_000
}

const fn default_max_elapsed_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

/// Evaluation pass configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvalConfig {
    /// Gold QA dataset
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// Categories evaluated by default
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,

    /// Cap per category, for faster iterations
    #[serde(default)]
    pub max_per_category: Option<usize>,

    /// Concurrent QA items per pass (1-64)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Score with the LLM judge in addition to token F1
    #[serde(default = "default_true")]
    pub use_judge: bool,

    /// Directory for per-iteration results and loop history
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Root of the engine's knowledge files; defaults to `$HOME/memory/knowledge`
    #[serde(default)]
    pub knowledge_dir: Option<PathBuf>,

    /// Upper bound on one item (prediction plus judging)
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
}

fn default_dataset() -> PathBuf {
    PathBuf::from("eval/qa_dataset.json")
}

fn default_categories() -> Vec<Category> {
    Category::DEFAULT_EVAL.to_vec()
}

const fn default_concurrency() -> usize {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("eval")
}

const fn default_item_timeout_secs() -> u64 {
    120
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            categories: default_categories(),
            max_per_category: None,
            concurrency: default_concurrency(),
            use_judge: true,
            output_dir: default_output_dir(),
            knowledge_dir: None,
            item_timeout_secs: default_item_timeout_secs(),
        }
    }
}

impl EvalConfig {
    /// Knowledge directory, defaulting to `~/memory/knowledge`.
    pub fn resolve_knowledge_dir(&self) -> PathBuf {
        self.knowledge_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map_or_else(|| PathBuf::from("."), PathBuf::from)
                .join("memory")
                .join("knowledge")
        })
    }
}

/// Improvement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TuningConfig {
    /// Starting similarity threshold
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Starting top-k
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Chunk size the engine is currently built with
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Upper bound on measured iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Stop once the judge score (percent) reaches this
    #[serde(default = "default_target_judge")]
    pub target_judge: f64,

    /// Reference ceiling F1 used for gap analysis
    #[serde(default = "default_ceiling_f1")]
    pub ceiling_f1: f64,

    /// Reference ceiling judge used for the efficiency summary
    #[serde(default = "default_ceiling_judge")]
    pub ceiling_judge: f64,

    /// Prior result to report the first iteration against
    #[serde(default)]
    pub baseline: Option<PathBuf>,

    /// Strategy catalog knobs
    #[serde(default)]
    pub strategies: StrategyConfig,
}

const fn default_threshold() -> f64 {
    0.15
}

const fn default_top_k() -> u32 {
    12
}

const fn default_chunk_size() -> u32 {
    1000
}

const fn default_max_iterations() -> u32 {
    6
}

const fn default_target_judge() -> f64 {
    13.5
}

const fn default_ceiling_f1() -> f64 {
    67.9
}

const fn default_ceiling_judge() -> f64 {
    14.0
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            max_iterations: default_max_iterations(),
            target_judge: default_target_judge(),
            ceiling_f1: default_ceiling_f1(),
            ceiling_judge: default_ceiling_judge(),
            baseline: None,
            strategies: StrategyConfig::default(),
        }
    }
}

/// Knobs for the strategy catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StrategyConfig {
    /// Lowest threshold the loop will try
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: f64,

    /// Threshold decrement per iteration
    #[serde(default = "default_threshold_step")]
    pub threshold_step: f64,

    /// Top-k increment per iteration
    #[serde(default = "default_top_k_step")]
    pub top_k_step: u32,

    /// Largest top-k the loop will try
    #[serde(default = "default_top_k_ceiling")]
    pub top_k_ceiling: u32,

    /// Raise top-k only while judge < target * this ratio
    #[serde(default = "default_top_k_target_ratio")]
    pub top_k_target_ratio: f64,

    /// Chunk size the reduce-chunk strategy expects to replace
    #[serde(default = "default_chunk_size")]
    pub chunk_size_from: u32,

    /// Chunk size after reduction
    #[serde(default = "default_reduced_chunk_size")]
    pub chunk_size_to: u32,

    /// Iteration after which the chunk size is reduced
    #[serde(default = "default_gate_iteration")]
    pub chunk_iteration: u32,

    /// Iteration after which the synthesis prompt is revised
    #[serde(default = "default_gate_iteration")]
    pub prompt_iteration: u32,

    /// Re-embed every N iterations
    #[serde(default = "default_reindex_every")]
    pub reindex_every: u32,
}

const fn default_threshold_floor() -> f64 {
    0.05
}

const fn default_threshold_step() -> f64 {
    0.03
}

const fn default_top_k_step() -> u32 {
    4
}

const fn default_top_k_ceiling() -> u32 {
    24
}

const fn default_top_k_target_ratio() -> f64 {
    0.9
}

const fn default_reduced_chunk_size() -> u32 {
    500
}

const fn default_gate_iteration() -> u32 {
    2
}

const fn default_reindex_every() -> u32 {
    2
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            threshold_floor: default_threshold_floor(),
            threshold_step: default_threshold_step(),
            top_k_step: default_top_k_step(),
            top_k_ceiling: default_top_k_ceiling(),
            top_k_target_ratio: default_top_k_target_ratio(),
            chunk_size_from: default_chunk_size(),
            chunk_size_to: default_reduced_chunk_size(),
            chunk_iteration: default_gate_iteration(),
            prompt_iteration: default_gate_iteration(),
            reindex_every: default_reindex_every(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format for the terminal
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for JSON log files (optional)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation of the log files
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Terminal log format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    #[default]
    Pretty,
}

/// How often log files roll over
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file every day
    #[default]
    Daily,
    /// New file every hour
    Hourly,
    /// A single file
    Never,
}
