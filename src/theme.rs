//! Terminal colours and the per-pair progress bar.
//!
//! Respects the `NO_COLOR` env-var and the `--no-color` CLI flag.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::controller::{PairOutcome, PairReport, RunSummary, StopReason};

static COLOR_DISABLED: AtomicBool = AtomicBool::new(false);

/// Call once at startup (after CLI parsing) to disable colour globally.
pub fn disable_color() {
    COLOR_DISABLED.store(true, Ordering::Relaxed);
    colored::control::set_override(false);
}

/// Initialise the colour system from the `NO_COLOR` env-var and the
/// `--no-color` flag.
pub fn init_color(no_color_flag: bool) {
    if no_color_flag
        || std::env::var("NO_COLOR")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    {
        disable_color();
    }
}

fn is_color() -> bool {
    !COLOR_DISABLED.load(Ordering::Relaxed)
}

pub mod palette {
    pub const ACCENT: (u8, u8, u8) = (0x3D, 0x8B, 0xFF);
    pub const SUCCESS: (u8, u8, u8) = (0x2F, 0xBF, 0x71);
    pub const WARN: (u8, u8, u8) = (0xFF, 0xB0, 0x20);
    pub const ERROR: (u8, u8, u8) = (0xE2, 0x3D, 0x2D);
    pub const MUTED: (u8, u8, u8) = (0x8B, 0x7F, 0x77);
}

fn apply(text: &str, rgb: (u8, u8, u8)) -> String {
    if is_color() {
        text.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        text.to_string()
    }
}

pub fn accent(text: &str) -> String {
    apply(text, palette::ACCENT)
}

pub fn success(text: &str) -> String {
    apply(text, palette::SUCCESS)
}

pub fn warn(text: &str) -> String {
    apply(text, palette::WARN)
}

pub fn error(text: &str) -> String {
    apply(text, palette::ERROR)
}

pub fn muted(text: &str) -> String {
    apply(text, palette::MUTED)
}

pub fn bold(text: &str) -> String {
    if is_color() {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Format "  Label : value" with the label muted.
pub fn label_value(label: &str, value: &str) -> String {
    format!("  {} : {}", muted(label), accent(value))
}

/// One line per pair: `[3] a <> b  merged, kept right record (contact_count)`.
pub fn pair_line(report: &PairReport) -> String {
    let text = report.outcome.to_string();
    let styled = match &report.outcome {
        PairOutcome::Merged(_) => success(&text),
        PairOutcome::Rejected(_) => accent(&text),
        PairOutcome::Skipped(_) => warn(&text),
        PairOutcome::Failed(_) => error(&text),
    };
    format!("{} {}  {}", muted(&format!("[{}]", report.index)), report.key, styled)
}

/// Multi-line run summary.
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let stop = match summary.stop {
        Some(StopReason::LimitReached) => "pair limit reached",
        Some(StopReason::QueueEmpty) => "queue empty",
        None => "interrupted",
    };
    let failed = summary.failed.to_string();
    vec![
        bold("Run summary"),
        label_value("Attempted", &summary.attempted.to_string()),
        format!("  {} : {}", muted("Merged   "), success(&summary.merged.to_string())),
        format!("  {} : {}", muted("Rejected "), accent(&summary.rejected.to_string())),
        format!("  {} : {}", muted("Skipped  "), warn(&summary.skipped.to_string())),
        format!(
            "  {} : {}",
            muted("Failed   "),
            if summary.failed > 0 { error(&failed) } else { failed }
        ),
        label_value("Stopped  ", stop),
    ]
}

/// Progress bar sized to the requested pair count.
pub fn progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let template = if is_color() {
        "{bar:30.cyan/blue} {pos}/{len} {msg}"
    } else {
        "{bar:30} {pos}/{len} {msg}"
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{PairKey, PairState};
    use crate::policy::{DecisionRule, MergeDecision, Side};

    #[test]
    fn test_no_color_output() {
        COLOR_DISABLED.store(true, Ordering::Relaxed);
        colored::control::set_override(false);

        assert_eq!(success("ok"), "ok");
        assert_eq!(label_value("Attempted", "3"), "  Attempted : 3");

        let report = PairReport {
            index: 2,
            key: PairKey::new("b", "a"),
            outcome: PairOutcome::Merged(MergeDecision::new(Side::Right, DecisionRule::ContactCount)),
            state: PairState::Merged,
        };
        assert_eq!(
            pair_line(&report),
            "[2] a <> b  merged, kept right record (contact_count)"
        );
    }

    #[test]
    fn test_summary_lines_mention_stop_reason() {
        COLOR_DISABLED.store(true, Ordering::Relaxed);
        colored::control::set_override(false);

        let summary = RunSummary {
            attempted: 4,
            merged: 3,
            failed: 1,
            stop: Some(StopReason::QueueEmpty),
            ..RunSummary::default()
        };
        let lines = summary_lines(&summary);
        assert_eq!(lines.len(), 7);
        assert!(lines.last().unwrap().ends_with("queue empty"));
    }
}
