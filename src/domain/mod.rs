//! Domain layer for the ragtune harness
//!
//! Pure data types, the port traits infrastructure adapters implement, and
//! the error taxonomy shared by every layer.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    DatasetError, EngineError, LlmError, RebuildError, StoreError, TuneError, TuneResult,
};
