//! Table output formatting for CLI commands
//!
//! Renders run reports, gap analyses, loop histories and comparisons using
//! comfy-table. Colors are dropped when `NO_COLOR` is set or the terminal is
//! dumb.

use std::env;

use comfy_table::{presets, Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::cli::commands::compare::ComparedRun;
use crate::domain::models::{Category, LoopHistory, RunResult};
use crate::services::conversation_bench::BASELINES;
use crate::services::failure_analyzer::priority_label;
use crate::services::{BenchReport, CategoryGap};

/// Width of a full comparison bar.
const BAR_WIDTH: f64 = 20.0;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    /// Formatter that colors output when the terminal supports it.
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Formatter with explicit color and width settings.
    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Per-category scores of one run, with deltas against `prev` when given.
    pub fn format_category_report(&self, run: &RunResult, prev: Option<&RunResult>) -> String {
        let mut table = self.create_base_table();
        let mut header = vec![header_cell("Category"), header_cell("F1"), header_cell("Judge"), header_cell("N")];
        if prev.is_some() {
            header.push(header_cell("ΔF1"));
            header.push(header_cell("ΔJudge"));
        }
        table.set_header(header);

        for (category, stats) in &run.by_category {
            let mut row = vec![
                Cell::new(category.as_str()),
                number_cell(stats.avg_f1),
                number_cell(stats.avg_judge),
                Cell::new(stats.n).set_alignment(CellAlignment::Right),
            ];
            if let Some(prev) = prev {
                match prev.by_category.get(category) {
                    Some(before) => {
                        row.push(self.delta_cell(stats.avg_f1 - before.avg_f1));
                        row.push(self.delta_cell(stats.avg_judge - before.avg_judge));
                    }
                    None => {
                        row.push(Cell::new("-"));
                        row.push(Cell::new("-"));
                    }
                }
            }
            table.add_row(row);
        }

        let mut overall = vec![
            Cell::new("overall").add_attribute(Attribute::Bold),
            number_cell(run.overall_f1).add_attribute(Attribute::Bold),
            number_cell(run.overall_judge).add_attribute(Attribute::Bold),
            Cell::new(run.total_items()).set_alignment(CellAlignment::Right),
        ];
        if let Some(prev) = prev {
            overall.push(self.delta_cell(run.overall_f1 - prev.overall_f1));
            overall.push(self.delta_cell(run.overall_judge - prev.overall_judge));
        }
        table.add_row(overall);

        format!(
            "{}\n{table}\nNot found / wrong: {:.1}% | {:.0}s",
            run.label, run.not_found_rate, run.elapsed_seconds
        )
    }

    /// How much of the ceiling's score retrieval recovers.
    pub fn format_efficiency(&self, run: &RunResult, ceiling: &RunResult) -> String {
        let efficiency = run.efficiency_against(ceiling);
        let mut lines = vec!["Retrieval efficiency vs ceiling:".to_string()];
        if let Some(f1) = efficiency.f1 {
            lines.push(format!(
                "  Token-F1:  {:.1} / {:.1} = {:.0}% of ceiling",
                run.overall_f1,
                ceiling.overall_f1,
                f1 * 100.0
            ));
        }
        if let Some(judge) = efficiency.judge {
            lines.push(format!(
                "  LLM-judge: {:.1} / {:.1} = {:.0}% of ceiling",
                run.overall_judge,
                ceiling.overall_judge,
                judge * 100.0
            ));
        }
        lines.join("\n")
    }

    /// Categories ranked by distance to the ceiling F1.
    pub fn format_gaps(&self, gaps: &[CategoryGap], ceiling_f1: f64) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            header_cell("Category"),
            header_cell("F1"),
            header_cell("Judge"),
            header_cell("N"),
            header_cell("Gap"),
            header_cell("Priority"),
        ]);

        for gap in gaps {
            let label = priority_label(gap.gap);
            let priority = if self.use_colors {
                Cell::new(label).fg(priority_color(label))
            } else {
                Cell::new(label)
            };
            table.add_row(vec![
                Cell::new(gap.category.as_str()),
                number_cell(gap.f1),
                number_cell(gap.judge),
                Cell::new(gap.n).set_alignment(CellAlignment::Right),
                number_cell(gap.gap),
                priority,
            ]);
        }

        format!("Gap to ceiling F1 {ceiling_f1:.1}:\n{table}")
    }

    /// One row per loop iteration.
    pub fn format_history(&self, history: &LoopHistory) -> String {
        let mut table = self.create_base_table();
        table.set_header(vec![
            header_cell("Iter"),
            header_cell("F1"),
            header_cell("Judge"),
            header_cell("Threshold"),
            header_cell("Top-k"),
            header_cell("Chunk"),
            header_cell("Prompt"),
            header_cell("Applied"),
        ]);

        for entry in &history.history {
            let applied = if entry.applied.is_empty() {
                "-".to_string()
            } else {
                entry.applied.join("\n")
            };
            let judge = if entry.judge >= history.target && self.use_colors {
                number_cell(entry.judge).fg(Color::Green)
            } else {
                number_cell(entry.judge)
            };
            table.add_row(vec![
                Cell::new(entry.iteration).set_alignment(CellAlignment::Right),
                number_cell(entry.f1),
                judge,
                Cell::new(entry.threshold).set_alignment(CellAlignment::Right),
                Cell::new(entry.top_k).set_alignment(CellAlignment::Right),
                Cell::new(entry.chunk_size).set_alignment(CellAlignment::Right),
                Cell::new(entry.prompt_variant),
                Cell::new(applied),
            ]);
        }

        table.to_string()
    }

    /// Conversation benchmark scores next to the published baselines.
    pub fn format_bench(&self, report: &BenchReport) -> String {
        let mut by_type = self.create_base_table();
        by_type.set_header(vec![header_cell("Question type"), header_cell("F1"), header_cell("N")]);
        for (question_type, stats) in &report.by_type {
            by_type.add_row(vec![
                Cell::new(question_type.as_str()),
                number_cell(stats.avg_f1),
                Cell::new(stats.n).set_alignment(CellAlignment::Right),
            ]);
        }
        by_type.add_row(vec![
            Cell::new("overall").add_attribute(Attribute::Bold),
            number_cell(report.overall_f1).add_attribute(Attribute::Bold),
            Cell::new(report.questions).set_alignment(CellAlignment::Right),
        ]);

        let mut baselines = self.create_base_table();
        baselines.set_header(vec![header_cell("System"), header_cell("F1")]);
        for (name, f1) in BASELINES {
            baselines.add_row(vec![Cell::new(name), number_cell(f1)]);
        }
        baselines.add_row(vec![
            Cell::new("this engine").add_attribute(Attribute::Bold),
            number_cell(report.overall_f1).add_attribute(Attribute::Bold),
        ]);

        let gap = report.gap_to_best_memory_system();
        let verdict = if gap <= 0.0 {
            format!("Beats the best memory system by {:.1} F1", -gap)
        } else {
            format!("{gap:.1} F1 behind the best memory system")
        };

        format!(
            "{} conversations | {} questions | {:.0}s | not found {:.1}%\n{by_type}\n{baselines}\n{verdict}",
            report.conversations,
            report.questions,
            report.elapsed.as_secs_f64(),
            report.not_found_rate
        )
    }

    /// Runs sorted by judge with a bar relative to the ceiling judge.
    pub fn format_comparison(&self, runs: &[ComparedRun], ceiling_judge: f64) -> String {
        let best_judge = runs.iter().map(|r| r.judge).fold(f64::NEG_INFINITY, f64::max);

        let mut table = self.create_base_table();
        table.set_header(vec![
            header_cell("Run"),
            header_cell("F1"),
            header_cell("Judge"),
            header_cell("!Found"),
            header_cell("Chart"),
        ]);
        for run in runs {
            let mut bar = judge_bar(run.judge, ceiling_judge);
            if run.judge == best_judge {
                bar.push_str(" ★");
            }
            let bar = if self.use_colors { Cell::new(bar).fg(Color::Cyan) } else { Cell::new(bar) };
            table.add_row(vec![
                Cell::new(&run.name),
                number_cell(run.f1),
                number_cell(run.judge),
                Cell::new(format!("{:.1}%", run.not_found_rate)).set_alignment(CellAlignment::Right),
                bar,
            ]);
        }

        format!("{} runs | ceiling: {ceiling_judge:.1} judge\n{table}", runs.len())
    }

    fn delta_cell(&self, delta: f64) -> Cell {
        let cell = Cell::new(format_delta(delta)).set_alignment(CellAlignment::Right);
        if !self.use_colors || delta.abs() < 0.05 {
            cell
        } else if delta > 0.0 {
            cell.fg(Color::Green)
        } else {
            cell.fg(Color::Red)
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    console::colors_enabled()
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn number_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.1}")).set_alignment(CellAlignment::Right)
}

fn priority_color(label: &str) -> Color {
    match label {
        "HIGH" => Color::Red,
        "medium" => Color::Yellow,
        _ => Color::Green,
    }
}

/// Signed one-decimal delta, e.g. `+1.5` or `-0.3`.
pub fn format_delta(delta: f64) -> String {
    format!("{delta:+.1}")
}

/// At least one block; a run at the ceiling gets the full width.
pub fn judge_bar(judge: f64, ceiling_judge: f64) -> String {
    let blocks = if ceiling_judge > 0.0 {
        (judge / ceiling_judge * BAR_WIDTH).floor().max(1.0) as usize
    } else {
        1
    };
    "█".repeat(blocks)
}

/// Comma-separated category names.
pub fn format_category_list(categories: &[Category]) -> String {
    categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}
