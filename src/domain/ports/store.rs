//! Result Store Port
//!
//! Durable storage for per-iteration run results and the loop history.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::models::{LoopHistory, RunResult};

/// Persistence for loop artifacts.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist the result of one loop iteration, keyed by its number.
    async fn save_iteration(&self, iteration: u32, run: &RunResult) -> Result<PathBuf, StoreError>;

    /// Persist the whole loop history, replacing any previous copy.
    async fn save_history(&self, history: &LoopHistory) -> Result<PathBuf, StoreError>;
}
