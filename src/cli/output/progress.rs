//! Progress bars for evaluation passes using indicatif.
//!
//! Bars draw to stderr and are hidden entirely in JSON mode or when stderr is
//! not a terminal, so stdout only ever carries the report.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg} (ETA: {eta})";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

fn visible(json_mode: bool) -> bool {
    !json_mode && console::Term::stderr().is_term()
}

/// Bar for one evaluation pass; the runner sets its length.
pub fn pass_progress(json_mode: bool, message: impl Into<String>) -> ProgressBar {
    if !visible(json_mode) {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars(PROGRESS_CHARS));
    }
    pb.set_message(message.into());
    pb
}

/// Spinner for steps of unknown length (benchmarks, rebuilds).
pub fn spinner(json_mode: bool, message: impl Into<String>) -> ProgressBar {
    if !visible(json_mode) {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_hides_bars() {
        assert!(pass_progress(true, "eval").is_hidden());
        assert!(spinner(true, "bench").is_hidden());
    }
}
