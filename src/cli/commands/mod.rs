//! Command implementations and the wiring they share.

pub mod bench;
pub mod compare;
pub mod eval;
pub mod tune;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::errors::TuneError;
use crate::domain::models::{Category, EngineConfig, LlmConfig, QaItem};
use crate::domain::ports::CompletionClient;
use crate::infrastructure::engine::CliEngine;
use crate::infrastructure::llm::GeminiClient;
use crate::infrastructure::storage::load_qa_dataset;

/// Build the engine adapter, failing fast when its binary is missing.
pub(crate) fn require_engine(config: &EngineConfig, model: Option<String>) -> Result<Arc<CliEngine>> {
    if !config.binary.exists() {
        return Err(TuneError::MissingEngine(config.binary.clone()).into());
    }
    let engine = CliEngine::from_config(config).with_model(model.or_else(|| config.model.clone()));
    Ok(Arc::new(engine))
}

/// Build the shared completion client; `purpose` names what needs it.
pub(crate) fn completion_client(config: &LlmConfig, purpose: &str) -> Result<Arc<dyn CompletionClient>> {
    let client = GeminiClient::from_config(config)
        .with_context(|| format!("{purpose} requires {} to be set", config.api_key_env))?;
    Ok(Arc::new(client))
}

/// Parse `--categories`; an empty list means `default`.
pub(crate) fn parse_categories(raw: &[String], default: &[Category]) -> Result<Vec<Category>> {
    if raw.is_empty() {
        return Ok(default.to_vec());
    }
    raw.iter()
        .map(|name| name.parse::<Category>().map_err(anyhow::Error::from))
        .collect()
}

/// Load the gold dataset and pick the evaluated items in dataset order.
pub(crate) fn load_items(
    path: &Path,
    categories: &[Category],
    max_per_category: Option<usize>,
) -> Result<Vec<QaItem>> {
    let dataset = load_qa_dataset(path)?;
    let items = dataset.select(categories, max_per_category);
    if items.is_empty() {
        anyhow::bail!(
            "No QA items in {} for categories: {}",
            path.display(),
            crate::cli::output::table::format_category_list(categories)
        );
    }
    tracing::info!(
        dataset = %path.display(),
        items = items.len(),
        categories = categories.len(),
        "dataset loaded"
    );
    Ok(items)
}
