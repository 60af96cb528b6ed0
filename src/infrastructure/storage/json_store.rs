//! JSON file persistence for run results and loop history.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::StoreError;
use crate::domain::models::{LoopHistory, RunResult, RunSummary};
use crate::domain::ports::store::ResultStore;

/// File name of the persisted loop history.
pub const HISTORY_FILE: &str = "loop_results.json";

/// File name of the persisted result for loop iteration `iteration`.
pub fn iteration_file_name(iteration: u32) -> String {
    format!("loop_iter_{iteration}.json")
}

/// Stores every artifact as pretty-printed JSON under one directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Store writing under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a standalone run under `file_name`.
    pub async fn save_run(&self, file_name: &str, run: &RunResult) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(file_name);
        write_json(&path, run).await?;
        Ok(path)
    }
}

#[async_trait]
impl ResultStore for JsonStore {
    async fn save_iteration(&self, iteration: u32, run: &RunResult) -> Result<PathBuf, StoreError> {
        self.save_run(&iteration_file_name(iteration), run).await
    }

    async fn save_history(&self, history: &LoopHistory) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(HISTORY_FILE);
        write_json(&path, history).await?;
        Ok(path)
    }
}

/// Serialize `value` to `path`, creating parent directories.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |e: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(io_err)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load a full run result written by this tool.
pub async fn load_run(path: &Path) -> Result<RunResult, StoreError> {
    read_json(path).await
}

/// Load the headline numbers of any run file, including partial ones.
pub async fn load_summary(path: &Path) -> Result<RunSummary, StoreError> {
    read_json(path).await
}

/// Load a persisted loop history.
pub async fn load_history(path: &Path) -> Result<LoopHistory, StoreError> {
    read_json(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{HistoryEntry, IterationState, RunConfig};
    use std::collections::BTreeMap;

    fn run(f1: f64) -> RunResult {
        RunResult {
            overall_f1: f1,
            overall_judge: 10.0,
            elapsed_seconds: 2.5,
            label: "project=Personal | t=0.15 k=12".into(),
            by_category: BTreeMap::new(),
            config: RunConfig::default(),
            not_found_rate: 12.5,
        }
    }

    #[tokio::test]
    async fn test_save_iteration_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("out"));

        let path = store.save_iteration(3, &run(41.0)).await.unwrap();
        assert!(path.ends_with("loop_iter_3.json"));

        let loaded = load_run(&path).await.unwrap();
        assert_eq!(loaded, run(41.0));
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let mut history = LoopHistory::new(13.5);
        history
            .append(HistoryEntry::new(1, &IterationState::new(0.15, 12, 1000), &run(40.0)))
            .unwrap();

        let path = store.save_history(&history).await.unwrap();
        assert!(path.ends_with(HISTORY_FILE));
        assert_eq!(load_history(&path).await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_summary_tolerates_minimal_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        tokio::fs::write(&path, r#"{"overall_f1": 55.2, "label": "FULL-CONTEXT"}"#)
            .await
            .unwrap();

        let summary = load_summary(&path).await.unwrap();
        assert!((summary.overall_f1 - 55.2).abs() < f64::EPSILON);
        assert!(summary.overall_judge.abs() < f64::EPSILON);
        assert!(load_run(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = load_run(Path::new("/nonexistent/run.json")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
