use std::cmp::Reverse;
use std::time::Duration;

use specpulse_core::store::{LogEntry, Store, SummaryStats, WorkerState};

use super::{format_elapsed, progress_bar, tail_truncate, TITLE, WORKER_BAR_WIDTH};

/// The finalize pass prints at most this many log summary rows.
pub const FINAL_LOG_CAP: usize = 20;

const MIN_REPORT_WIDTH: usize = 40;

/// Snapshot for the one-shot terminal report printed after the live loop
/// exits. Captured once so the composition is a pure function of this value.
pub struct ReportView {
    pub workers: Vec<(String, WorkerState)>,
    pub summary: SummaryStats,
    pub failed_specs: Vec<String>,
    pub logs: Vec<(String, LogEntry)>,
    pub unique_logs: usize,
    pub elapsed: Duration,
}

impl ReportView {
    pub fn capture(store: &Store) -> Self {
        let all_logs = store.current_logs();
        let unique_logs = all_logs.len();
        let mut logs: Vec<_> = all_logs.into_iter().collect();
        logs.sort_by_key(|(text, entry)| {
            (
                Reverse(entry.count),
                Reverse(entry.level.severity()),
                text.clone(),
            )
        });
        logs.truncate(FINAL_LOG_CAP);
        Self {
            workers: store.sorted_workers(),
            summary: store.summary_stats(),
            failed_specs: store.failed_specs(),
            logs,
            unique_logs,
            elapsed: store.elapsed(),
        }
    }
}

/// Compose the static finalize frame: the last dashboard state in plain text
/// plus the run report, printed to the main screen after the alternate
/// screen is gone.
pub fn render_report(view: &ReportView, width: usize) -> String {
    let width = width.max(MIN_REPORT_WIDTH);
    let mut lines: Vec<String> = Vec::new();

    lines.push(TITLE.to_string());
    lines.push(String::new());
    lines.push(format!(
        "Passed {}   Failed {}   Pending {}",
        view.summary.passed, view.summary.failed, view.summary.pending
    ));
    for (id, worker) in &view.workers {
        lines.push(format!(
            "Worker {:<3} {} {:>4.0}%  pass {:<4} fail {:<4} pend {:<4} {}",
            id,
            progress_bar(worker.percent, WORKER_BAR_WIDTH),
            worker.percent * 100.0,
            worker.passed,
            worker.failed,
            worker.pending,
            tail_truncate(&worker.current_file, width.saturating_sub(60).max(16)),
        ));
    }

    lines.push(String::new());
    lines.push("=".repeat(width));
    if view.failed_specs.is_empty() {
        lines.push("ALL TESTS PASSED".to_string());
    } else {
        lines.push(format!("FAILED SPECS ({})", view.failed_specs.len()));
        for spec in &view.failed_specs {
            lines.push(format!("  * {spec}"));
        }
    }
    lines.push(String::new());
    lines.push(format!("Total time: {}", format_elapsed(view.elapsed)));

    if !view.logs.is_empty() {
        lines.push(String::new());
        lines.push(format!("SYSTEM MESSAGES ({} unique)", view.unique_logs));
        lines.push("-".repeat(width));
        for (text, entry) in &view.logs {
            lines.push(format!(
                "  [{:<5}] x{:>3}  {}",
                entry.level.tag(),
                entry.count,
                tail_truncate(text, width.saturating_sub(18)),
            ));
        }
    }
    lines.push("=".repeat(width));
    lines.push(String::new());

    lines.join("\n")
}
