//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Engine subprocess adapter
//! - Gemini completion client
//! - Tuning file rebuilder
//! - JSON persistence and dataset loading
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod engine;
pub mod llm;
pub mod logging;
pub mod rebuild;
pub mod storage;
