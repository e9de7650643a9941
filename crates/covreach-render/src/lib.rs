//! Rendering utilities for covreach reports.
//!
//! This crate turns a `Report` into:
//! - a Markdown summary for CI job pages and pull requests
//! - one-line console summaries for the CLI
//!
//! # Example
//!
//! ```rust
//! use covreach_render::{render_markdown, render_summary_line};
//! use covreach_types::Report;
//!
//! let report = Report::default();
//! let markdown = render_markdown(&report, 10);
//! assert_eq!(render_summary_line(&report), "covreach: skip (no cases selected)");
//! ```

use covreach_types::{CaseResult, Report, RunStatus};

/// Default maximum number of failures detailed in Markdown.
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// Returns an emoji representing the run status.
///
/// # Examples
///
/// ```rust
/// use covreach_render::status_emoji;
/// use covreach_types::RunStatus;
///
/// assert_eq!(status_emoji(&RunStatus::Pass), "\u{2705}");
/// assert_eq!(status_emoji(&RunStatus::Fail), "\u{274C}");
/// ```
pub fn status_emoji(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Pass => "\u{2705}",
        RunStatus::Fail => "\u{274C}",
        RunStatus::Skip => "\u{23ED}\u{FE0F}",
    }
}

fn status_label(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Pass => "pass",
        RunStatus::Fail => "fail",
        RunStatus::Skip => "skip",
    }
}

fn verdict_label(result: &CaseResult) -> &'static str {
    if result.verdict.success {
        "pass"
    } else {
        "fail"
    }
}

fn format_duration(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

/// Renders the report as Markdown.
///
/// At most `max_failures` failing cases get a detail block; the results
/// table always lists every case.
pub fn render_markdown(report: &Report, max_failures: usize) -> String {
    let mut output = String::new();

    output.push_str("## covreach: Coverage Matrix Report\n\n");

    let status = &report.summary.status;
    output.push_str(&format!(
        "**Status**: {} {}\n\n",
        status_emoji(status),
        status_label(status)
    ));

    output.push_str("### Summary\n");
    output.push_str(&format!("- **Cases**: {}\n", report.summary.total));
    output.push_str(&format!("- **Passed**: {}\n", report.summary.passed));
    output.push_str(&format!("- **Failed**: {}\n", report.summary.failed));

    if report.results.is_empty() {
        output.push_str("\nNo cases were selected.\n");
        return output;
    }

    output.push_str("\n### Results\n\n");
    output.push_str("| Case | Verdict | Ended by | Polls | Duration |\n");
    output.push_str("|------|---------|----------|-------|----------|\n");
    for result in &report.results {
        output.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            result.name,
            verdict_label(result),
            result.ended_by.as_str(),
            result.polls,
            format_duration(result.duration_ms)
        ));
    }

    let failures: Vec<&CaseResult> = report
        .results
        .iter()
        .filter(|r| !r.verdict.success)
        .collect();
    if failures.is_empty() {
        return output;
    }

    output.push_str("\n### Failures\n");
    for failure in failures.iter().take(max_failures) {
        output.push_str(&format!("\n#### {}\n\n", failure.name));
        output.push_str("```text\n");
        output.push_str(&failure.verdict.message);
        output.push_str("\n```\n");
    }
    if failures.len() > max_failures {
        output.push_str(&format!(
            "\n*Showing {} of {} failures*\n",
            max_failures,
            failures.len()
        ));
    }

    output.push_str("\n<details>\n");
    output.push_str("<summary>Reproduce locally</summary>\n\n");
    output.push_str("```bash\n");
    let mut cmd_parts = vec!["covreach run".to_string()];
    for failure in failures.iter().take(max_failures) {
        cmd_parts.push(format!("--case {}", failure.name));
    }
    output.push_str(&cmd_parts.join(" \\\n  "));
    output.push_str("\n```\n\n");
    output.push_str("</details>\n");

    output
}

/// One-line summary of a whole run.
pub fn render_summary_line(report: &Report) -> String {
    let summary = &report.summary;
    if summary.total == 0 {
        return format!("covreach: {} (no cases selected)", status_label(&summary.status));
    }
    format!(
        "covreach: {} ({}/{} cases covered)",
        status_label(&summary.status),
        summary.passed,
        summary.total
    )
}

/// One-line console summary of a finished case.
pub fn render_case_line(result: &CaseResult) -> String {
    let polls = match result.polls {
        1 => "1 poll".to_string(),
        n => format!("{n} polls"),
    };
    format!(
        "{} {} ({}, {}, {})",
        verdict_label(result).to_uppercase(),
        result.name,
        result.ended_by.as_str(),
        polls,
        format_duration(result.duration_ms)
    )
}

// ============================================================================
// Tests
// ============================================================================
