//! Gold dataset loading.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::domain::errors::DatasetError;
use crate::domain::models::{ConversationDataset, QaDataset};

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| DatasetError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| DatasetError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load `{qa_pairs: [...]}`. Unknown categories fail the whole load.
pub fn load_qa_dataset(path: &Path) -> Result<QaDataset, DatasetError> {
    let dataset: QaDataset = load(path)?;
    tracing::debug!(path = %path.display(), items = dataset.qa_pairs.len(), "loaded QA dataset");
    Ok(dataset)
}

/// Load `{conversations: [...]}` for the conversation benchmark.
pub fn load_conversations(path: &Path) -> Result<ConversationDataset, DatasetError> {
    let dataset: ConversationDataset = load(path)?;
    tracing::debug!(
        path = %path.display(),
        conversations = dataset.conversations.len(),
        "loaded conversation dataset"
    );
    Ok(dataset)
}
