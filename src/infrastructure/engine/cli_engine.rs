//! Engine adapter that drives the engine binary as a subprocess.
//!
//! Every invocation runs with its own timeout. The child is killed when the
//! timeout elapses (the pending future owns it with `kill_on_drop`).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::errors::EngineError;
use crate::domain::models::config::{EngineConfig, EngineTimeouts};
use crate::domain::models::{Category, PredictionResult};
use crate::domain::ports::engine::{
    AskRequest, EmbedSummary, Engine, METADATA_PREFIXES, NOT_FOUND_SENTINEL,
};

/// Longest stderr excerpt kept in errors and logs.
const STDERR_EXCERPT: usize = 500;

/// Captured output of a successful invocation.
#[derive(Debug)]
struct Invocation {
    stdout: String,
    status: Option<i32>,
}

/// Subprocess-backed [`Engine`].
#[derive(Debug, Clone)]
pub struct CliEngine {
    binary: PathBuf,
    provider: String,
    model: Option<String>,
    model_env_var: String,
    tuning_file: PathBuf,
    tuning_env_var: String,
    timeouts: EngineTimeouts,
}

impl CliEngine {
    /// Engine driven through the configured binary.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            provider: config.provider.clone(),
            model: config.model.clone(),
            model_env_var: config.model_env_var.clone(),
            tuning_file: config.tuning_file.clone(),
            tuning_env_var: config.tuning_env_var.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Override the model exported to `ask` invocations.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Path of the engine binary.
    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    fn describe(&self, args: &[String]) -> String {
        let name = self
            .binary
            .file_name()
            .map_or_else(|| self.binary.display().to_string(), |n| n.to_string_lossy().into_owned());
        match args.first() {
            Some(sub) => format!("{name} {sub}"),
            None => name,
        }
    }

    async fn invoke(&self, args: Vec<String>, timeout_secs: u64) -> Result<Invocation, EngineError> {
        let command = self.describe(&args);

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .env(&self.tuning_env_var, &self.tuning_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(model) = &self.model {
            cmd.env(&self.model_env_var, model);
        }

        let child = cmd.spawn().map_err(|e| EngineError::SpawnFailed {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        let output = match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(EngineError::SpawnFailed {
                    command,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(EngineError::Timeout {
                    command,
                    timeout_secs,
                })
            }
        };

        let status = output.status.code();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::NonZeroExit {
                command,
                status,
                stderr: excerpt(stderr.trim(), STDERR_EXCERPT),
            });
        }

        Ok(Invocation {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status,
        })
    }

    fn ask_args(request: &AskRequest) -> Vec<String> {
        let mut args = vec![
            "ask".to_string(),
            request.question.clone(),
            "--project".to_string(),
            request.project.clone(),
            "--threshold".to_string(),
            request.threshold.to_string(),
            "--top-k".to_string(),
            request.top_k.to_string(),
        ];
        if request.use_graph {
            args.push("--use-graph".to_string());
        }
        if request.concise {
            args.push("--concise".to_string());
        }
        args
    }
}

#[async_trait]
impl Engine for CliEngine {
    async fn ask(&self, request: &AskRequest) -> PredictionResult {
        let started = Instant::now();
        let result = self
            .invoke(Self::ask_args(request), self.timeouts.ask_secs)
            .await;
        let latency = started.elapsed();

        match result {
            Ok(invocation) if invocation.stdout.contains(NOT_FOUND_SENTINEL) => {
                tracing::debug!(question = %request.question, "engine reported not found");
                PredictionResult::empty(latency, invocation.status)
            }
            Ok(invocation) => PredictionResult {
                text: clean_answer(&invocation.stdout),
                latency,
                exit_status: invocation.status,
            },
            Err(EngineError::NonZeroExit { status, stderr, .. }) => {
                tracing::warn!(status = ?status, stderr = %stderr, "engine ask failed");
                PredictionResult::empty(latency, status)
            }
            Err(e) => {
                tracing::warn!(error = %e, "engine ask failed");
                PredictionResult::empty(latency, None)
            }
        }
    }

    async fn add(
        &self,
        project: &str,
        category: Category,
        content: &str,
        label: &str,
    ) -> Result<(), EngineError> {
        let args = vec![
            "add".to_string(),
            project.to_string(),
            category.as_str().to_string(),
            content.to_string(),
            "--label".to_string(),
            label.to_string(),
        ];
        self.invoke(args, self.timeouts.add_secs).await?;
        Ok(())
    }

    async fn embed(&self, project: &str) -> Result<EmbedSummary, EngineError> {
        let args = vec![
            "embed".to_string(),
            project.to_string(),
            "--provider".to_string(),
            self.provider.clone(),
        ];
        let invocation = self.invoke(args, self.timeouts.embed_secs).await?;
        let summary = EmbedSummary {
            total_chunks: parse_total_chunks(&invocation.stdout),
        };
        tracing::info!(project, total_chunks = ?summary.total_chunks, "embedding complete");
        Ok(summary)
    }

    async fn build_graph(&self, project: &str) -> Result<(), EngineError> {
        let args = vec!["graph".to_string(), "build".to_string(), project.to_string()];
        self.invoke(args, self.timeouts.graph_secs).await?;
        Ok(())
    }

    async fn forget(&self, project: &str) -> Result<(), EngineError> {
        let args = vec!["forget".to_string(), project.to_string(), "--force".to_string()];
        self.invoke(args, self.timeouts.forget_secs).await?;
        Ok(())
    }
}

/// Drop metadata lines from `ask` output and trim what is left.
pub fn clean_answer(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !METADATA_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Value of a `Total chunks: N` line, if any.
pub fn parse_total_chunks(stdout: &str) -> Option<u64> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once("Total chunks:")?;
        rest.split_whitespace().next()?.trim_end_matches(',').parse().ok()
    })
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
