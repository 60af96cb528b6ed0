//! Rebuilder Port
//!
//! Makes a new declarative engine tuning active. Implementations must leave
//! the previously active tuning in place when they return an error.

use async_trait::async_trait;

use crate::domain::errors::RebuildError;
use crate::domain::models::EngineTuning;

/// Activates engine tunings.
#[async_trait]
pub trait EngineRebuilder: Send + Sync {
    /// Activate `tuning`, rebuilding the engine if required.
    async fn rebuild(&self, tuning: &EngineTuning) -> Result<(), RebuildError>;

    /// Tuning currently active, if any has been written.
    async fn current(&self) -> Result<Option<EngineTuning>, RebuildError>;
}
