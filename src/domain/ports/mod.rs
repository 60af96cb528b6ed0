//! Port trait definitions (Hexagonal Architecture)
//!
//! - Engine: the retrieval/answering engine under test
//! - CompletionClient: remote LLM text completion
//! - EngineRebuilder: activating a new engine tuning
//! - ResultStore: persisting run results and loop history
//!
//! Services depend only on these traits, so tests swap in fakes freely.

pub mod completion;
pub mod engine;
pub mod rebuilder;
pub mod store;

pub use completion::{CompletionClient, CompletionRequest};
pub use engine::{AskRequest, EmbedSummary, Engine, METADATA_PREFIXES, NOT_FOUND_SENTINEL};
pub use rebuilder::EngineRebuilder;
pub use store::ResultStore;
