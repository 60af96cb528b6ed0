//! Engine adapters

pub mod cli_engine;

pub use cli_engine::CliEngine;
