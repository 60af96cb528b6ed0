//! Declarative tuning file plus optional build step.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::domain::errors::RebuildError;
use crate::domain::models::config::BuildConfig;
use crate::domain::models::EngineTuning;
use crate::domain::ports::rebuilder::EngineRebuilder;

/// [`EngineRebuilder`] that writes the tuning file the engine reads at
/// startup and runs the configured build command.
///
/// Rebuilds are serialized through an internal gate. On any failure the file
/// is restored to its previous bytes, or removed if it did not exist.
pub struct TuningFileRebuilder {
    path: PathBuf,
    build: BuildConfig,
    gate: Mutex<()>,
}

impl TuningFileRebuilder {
    /// Rebuilder writing `path` and running `build`.
    pub fn new(path: impl Into<PathBuf>, build: BuildConfig) -> Self {
        Self {
            path: path.into(),
            build,
            gate: Mutex::new(()),
        }
    }

    /// Tuning file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn snapshot(&self) -> Result<Option<Vec<u8>>, RebuildError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RebuildError::ReadFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), RebuildError> {
        let write_failed = |e: std::io::Error| RebuildError::WriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await.map_err(write_failed)?;
        tokio::fs::rename(&staging, &self.path).await.map_err(write_failed)
    }

    async fn restore(&self, snapshot: Option<Vec<u8>>) {
        let result = match snapshot {
            Some(bytes) => self.write(&bytes).await,
            None => match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(RebuildError::WriteFailed {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }),
                _ => Ok(()),
            },
        };
        if let Err(e) = result {
            tracing::error!(error = %e, path = %self.path.display(), "failed to restore tuning file");
        }
    }

    async fn run_build(&self) -> Result<(), RebuildError> {
        let Some((program, args)) = self.build.command.split_first() else {
            return Ok(());
        };

        tracing::info!(program = %program, "running engine build");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.build.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| RebuildError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let output = timeout(
            Duration::from_secs(self.build.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RebuildError::BuildTimeout(self.build.timeout_secs))?
        .map_err(|e| RebuildError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            Err(RebuildError::BuildFailed {
                status: output.status.code(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            })
        }
    }
}

#[async_trait]
impl EngineRebuilder for TuningFileRebuilder {
    async fn rebuild(&self, tuning: &EngineTuning) -> Result<(), RebuildError> {
        let _gate = self.gate.lock().await;

        let snapshot = self.snapshot().await?;
        let bytes = serde_json::to_vec_pretty(tuning).map_err(|e| RebuildError::WriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if snapshot.as_deref() == Some(bytes.as_slice()) {
            tracing::debug!(path = %self.path.display(), "tuning already active");
            return Ok(());
        }

        if let Err(e) = self.write(&bytes).await {
            self.restore(snapshot).await;
            return Err(e);
        }

        if let Err(e) = self.run_build().await {
            tracing::warn!(error = %e, "engine build failed, reverting tuning file");
            self.restore(snapshot).await;
            return Err(e);
        }

        tracing::info!(
            chunk_size = tuning.chunk_size,
            prompt_variant = %tuning.prompt_variant,
            "engine tuning activated"
        );
        Ok(())
    }

    async fn current(&self) -> Result<Option<EngineTuning>, RebuildError> {
        let Some(bytes) = self.snapshot().await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RebuildError::ReadFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::PromptVariant;

    fn tuning(chunk_size: u32) -> EngineTuning {
        EngineTuning {
            chunk_size,
            prompt_variant: PromptVariant::Baseline,
        }
    }

    fn build(command: &[&str]) -> BuildConfig {
        BuildConfig {
            command: command.iter().map(|s| (*s).to_string()).collect(),
            working_dir: None,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_rebuild_without_build_step_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tuning.json");
        let rebuilder = TuningFileRebuilder::new(&path, BuildConfig::default());

        assert_eq!(rebuilder.current().await.unwrap(), None);
        rebuilder.rebuild(&tuning(500)).await.unwrap();
        assert_eq!(rebuilder.current().await.unwrap(), Some(tuning(500)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_build_restores_previous_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        let original = b"{ \"chunk_size\": 1000, \"prompt_variant\": \"baseline\" }\n";
        std::fs::write(&path, original).unwrap();

        let rebuilder = TuningFileRebuilder::new(&path, build(&["sh", "-c", "echo nope >&2; exit 2"]));
        let err = rebuilder.rebuild(&tuning(500)).await.unwrap_err();

        assert!(matches!(err, RebuildError::BuildFailed { status: Some(2), .. }));
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_build_removes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");

        let rebuilder = TuningFileRebuilder::new(&path, build(&["false"]));
        assert!(rebuilder.rebuild(&tuning(500)).await.is_err());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_timeout_reverts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        let mut config = build(&["sleep", "5"]);
        config.timeout_secs = 1;

        let rebuilder = TuningFileRebuilder::new(&path, config);
        let err = rebuilder.rebuild(&tuning(500)).await.unwrap_err();
        assert!(matches!(err, RebuildError::BuildTimeout(1)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_build_program_reverts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");

        let rebuilder = TuningFileRebuilder::new(&path, build(&["/nonexistent/build-tool"]));
        let err = rebuilder.rebuild(&tuning(500)).await.unwrap_err();
        assert!(matches!(err, RebuildError::SpawnFailed { .. }));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_identical_tuning_skips_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        let marker = dir.path().join("built");

        let rebuilder = TuningFileRebuilder::new(
            &path,
            build(&["sh", "-c", &format!("echo x >> {}", marker.display())]),
        );
        rebuilder.rebuild(&tuning(500)).await.unwrap();
        rebuilder.rebuild(&tuning(500)).await.unwrap();

        let builds = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(builds.lines().count(), 1);
    }
}
