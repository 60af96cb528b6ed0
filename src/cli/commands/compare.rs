//! Implementation of the `ragtune compare` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Config, RunSummary};
use crate::infrastructure::storage::load_summary;

const NAME_WIDTH: usize = 35;

/// Arguments for `ragtune compare`.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Result files to compare
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Ceiling judge the bars are scaled against
    #[arg(long)]
    pub ceiling_judge: Option<f64>,
}

/// One run as shown in the comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ComparedRun {
    /// File stem, shortened for display.
    pub name: String,
    /// Overall F1, in percent.
    pub f1: f64,
    /// Overall judge score, in percent.
    pub judge: f64,
    /// Share of empty predictions, in percent.
    pub not_found_rate: f64,
    /// Configuration label recorded with the run.
    pub label: String,
}

impl ComparedRun {
    /// Build a row from a loaded run file.
    pub fn from_summary(path: &Path, summary: RunSummary) -> Self {
        let stem = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            name: truncate(&stem, NAME_WIDTH),
            f1: summary.overall_f1,
            judge: summary.overall_judge,
            not_found_rate: summary.not_found_rate,
            label: summary.label,
        }
    }
}

/// Comparison of several persisted runs.
#[derive(Debug, Serialize)]
pub struct CompareOutput {
    /// Judge score the bars are scaled against.
    pub ceiling_judge: f64,
    /// Sorted by judge, ascending.
    pub runs: Vec<ComparedRun>,
    /// Files that could not be read.
    pub skipped: Vec<String>,
}

impl CompareOutput {
    /// Sort `runs` by judge score.
    pub fn new(mut runs: Vec<ComparedRun>, ceiling_judge: f64, skipped: Vec<String>) -> Self {
        runs.sort_by(|a, b| a.judge.total_cmp(&b.judge));
        Self {
            ceiling_judge,
            runs,
            skipped,
        }
    }

    /// Run with the highest judge score.
    pub fn best(&self) -> Option<&ComparedRun> {
        self.runs.last()
    }

    /// `(f1, judge)` gained by the best run over the worst.
    pub fn improvement(&self) -> Option<(f64, f64)> {
        if self.runs.len() < 2 {
            return None;
        }
        let best = self.runs.last()?;
        let worst = self.runs.first()?;
        Some((best.f1 - worst.f1, best.judge - worst.judge))
    }
}

impl CommandOutput for CompareOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![TableFormatter::new().format_comparison(&self.runs, self.ceiling_judge)];
        if let Some(best) = self.best() {
            let share = if self.ceiling_judge > 0.0 {
                best.judge / self.ceiling_judge * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "Best: {}  judge={:.1}  ({share:.0}% of ceiling)",
                best.name, best.judge
            ));
        }
        if let Some((f1, judge)) = self.improvement() {
            lines.push(format!("Improvement over baseline: {f1:+.1} F1  {judge:+.1} judge"));
        }
        for skipped in &self.skipped {
            lines.push(format!("skipped {skipped}"));
        }
        lines.join("\n")
    }
}

/// Load and rank run files.
pub async fn execute(args: CompareArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut runs = Vec::with_capacity(args.files.len());
    let mut skipped = Vec::new();

    for path in &args.files {
        match load_summary(path).await {
            Ok(summary) => runs.push(ComparedRun::from_summary(path, summary)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable result");
                skipped.push(format!("{}: {e}", path.display()));
            }
        }
    }

    if runs.is_empty() {
        anyhow::bail!("No valid results found");
    }

    let ceiling_judge = args.ceiling_judge.unwrap_or(config.tuning.ceiling_judge);
    output(&CompareOutput::new(runs, ceiling_judge, skipped), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, f1: f64, judge: f64) -> ComparedRun {
        ComparedRun {
            name: name.into(),
            f1,
            judge,
            not_found_rate: 0.0,
            label: String::new(),
        }
    }

    #[test]
    fn test_sorted_ascending_with_improvement() {
        let out = CompareOutput::new(
            vec![run("v3", 45.0, 12.0), run("v1", 30.0, 6.0), run("v2", 40.0, 9.0)],
            14.0,
            vec![],
        );
        let names: Vec<_> = out.runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["v1", "v2", "v3"]);
        assert_eq!(out.best().unwrap().name, "v3");

        let (f1, judge) = out.improvement().unwrap();
        assert!((f1 - 15.0).abs() < 1e-9);
        assert!((judge - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_run_has_no_improvement() {
        let out = CompareOutput::new(vec![run("only", 30.0, 6.0)], 14.0, vec![]);
        assert!(out.improvement().is_none());
        assert!(out.to_human().contains("Best: only"));
    }

    #[test]
    fn test_name_is_file_stem() {
        let compared = ComparedRun::from_summary(
            Path::new("eval/loop_iter_3.json"),
            RunSummary {
                overall_f1: 1.0,
                ..RunSummary::default()
            },
        );
        assert_eq!(compared.name, "loop_iter_3");
    }

    #[tokio::test]
    async fn test_execute_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, r#"{"overall_f1": 40.0, "overall_judge": 10.0, "label": "x"}"#).unwrap();
        std::fs::write(&bad, "not json").unwrap();

        let args = CompareArgs {
            files: vec![good, bad],
            ceiling_judge: None,
        };
        execute(args, &Config::default(), true).await.unwrap();

        let args = CompareArgs {
            files: vec![dir.path().join("missing.json")],
            ceiling_judge: None,
        };
        assert!(execute(args, &Config::default(), true).await.is_err());
    }
}
