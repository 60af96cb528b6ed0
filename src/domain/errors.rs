//! Domain errors for the ragtune harness.
//!
//! Per-item and per-iteration failures are absorbed (they become zero scores
//! or "not applied" strategies), so most of these errors only surface at the
//! edges: startup validation, rebuild attempts, and persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single engine subprocess invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn engine `{command}`: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Engine `{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Engine `{command}` exited with status {status:?}: {stderr}")]
    NonZeroExit {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

/// Failures of a remote completion call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API credential: {0}")]
    MissingCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::MissingCredential(_) | Self::MalformedResponse(_) => false,
        }
    }
}

/// Failures of the serialized rebuild step.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("Failed to read tuning file {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to write tuning file {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Build command failed (status {status:?}): {stderr}")]
    BuildFailed { status: Option<i32>, stderr: String },

    #[error("Build command timed out after {0}s")]
    BuildTimeout(u64),

    #[error("Failed to spawn build command `{program}`: {reason}")]
    SpawnFailed { program: String, reason: String },
}

/// Dataset loading and validation failures.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read dataset {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid dataset {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown question type: {0}")]
    UnknownQuestionType(String),
}

/// Result and history persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Serialization error on {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },

    #[error("History out of order: iteration {attempted} follows {last}")]
    OutOfOrder { last: u32, attempted: u32 },
}

/// Umbrella error for the tuning session.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Engine binary not found: {0}")]
    MissingEngine(PathBuf),
}

/// Result alias for loop-level operations.
pub type TuneResult<T> = Result<T, TuneError>;
