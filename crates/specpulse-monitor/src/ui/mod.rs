pub mod report;
pub mod theme;

use std::time::Duration;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use specpulse_core::store::{LogEntry, Store, SummaryStats, WorkerState};

use self::theme::Theme;

pub const TITLE: &str = "SPECPULSE PARALLEL RUN MONITOR";
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Panel caps for the live frame; the finalize report applies its own cap.
pub const DIAG_PANEL_ROWS: usize = 10;
pub const INFO_PANEL_ROWS: usize = 5;
pub const SUMMARY_BAR_WIDTH: usize = 20;
pub const WORKER_BAR_WIDTH: usize = 15;
pub const WORKER_FILE_WIDTH: usize = 45;

/// Everything one frame needs, captured from the store in one pass so the
/// composition below stays a pure function of this value.
pub struct FrameView {
    pub workers: Vec<(String, WorkerState)>,
    pub summary: SummaryStats,
    pub diagnostics: Vec<(String, LogEntry)>,
    pub info: Vec<(String, LogEntry)>,
    pub elapsed: Duration,
    pub spinner: &'static str,
}

impl FrameView {
    pub fn capture(store: &Store, spinner_index: usize) -> Self {
        let mut diagnostics = store.diagnostic_logs();
        diagnostics.truncate(DIAG_PANEL_ROWS);
        let mut info = store.info_logs();
        info.truncate(INFO_PANEL_ROWS);
        Self {
            workers: store.sorted_workers(),
            summary: store.summary_stats(),
            diagnostics,
            info,
            elapsed: store.elapsed(),
            spinner: SPINNER_FRAMES[spinner_index % SPINNER_FRAMES.len()],
        }
    }
}

pub fn render(frame: &mut Frame, view: &FrameView) {
    let theme = theme::dashboard_theme();
    let mut constraints = vec![
        Constraint::Length(1),
        Constraint::Length(5),
        Constraint::Length(view.workers.len() as u16 + 3),
    ];
    if !view.diagnostics.is_empty() {
        constraints.push(Constraint::Length(view.diagnostics.len() as u16 + 3));
    }
    if !view.info.is_empty() {
        constraints.push(Constraint::Length(view.info.len() as u16 + 3));
    }
    constraints.push(Constraint::Min(0));
    constraints.push(Constraint::Length(1));

    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.size());

    let mut slot = 0;
    let mut next = || -> Rect {
        let area = areas[slot];
        slot += 1;
        area
    };

    frame.render_widget(title_line(theme), next());
    frame.render_widget(summary_panel(view, theme), next());
    frame.render_widget(worker_table(view, theme), next());
    if !view.diagnostics.is_empty() {
        frame.render_widget(log_table("Errors / Warnings", &view.diagnostics, theme), next());
    }
    if !view.info.is_empty() {
        frame.render_widget(log_table("Info", &view.info, theme), next());
    }
    let _spacer = next();
    frame.render_widget(footer(view, theme), next());
}

fn title_line(theme: Theme) -> Paragraph<'static> {
    Paragraph::new(Line::from(Span::styled(TITLE, theme.title_style())))
}

fn summary_panel(view: &FrameView, theme: Theme) -> Paragraph<'static> {
    let stats = &view.summary;
    let counters = Line::from(vec![
        Span::styled(format!("Passed {}", stats.passed), Style::default().fg(theme.ok)),
        Span::raw("   "),
        Span::styled(
            format!("Failed {}", stats.failed),
            Style::default().fg(theme.critical),
        ),
        Span::raw("   "),
        Span::styled(
            format!("Pending {}", stats.pending),
            Style::default().fg(theme.warn),
        ),
    ]);
    let progress = Line::from(vec![
        Span::raw("Overall progress: "),
        Span::styled(
            progress_bar(stats.avg_progress, SUMMARY_BAR_WIDTH),
            Style::default().fg(theme.accent),
        ),
        Span::raw(format!(" {:.1}%", stats.avg_progress * 100.0)),
    ]);
    let timer = Line::from(Span::raw(format!(
        "Elapsed: {}",
        format_elapsed(view.elapsed)
    )));

    Paragraph::new(Text::from(vec![counters, progress, timer]))
        .style(Style::default().fg(theme.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled("Run Summary", theme.title_style())),
        )
}

fn worker_table(view: &FrameView, theme: Theme) -> Table<'static> {
    let rows: Vec<Row> = view
        .workers
        .iter()
        .map(|(id, worker)| {
            Row::new(vec![
                Cell::from(Span::styled(
                    format!("Worker {id}"),
                    theme.worker_id_style(),
                )),
                Cell::from(progress_bar(worker.percent, WORKER_BAR_WIDTH)),
                Cell::from(format!("{:>3.0}%", worker.percent * 100.0)),
                Cell::from(Span::styled(
                    worker.passed.to_string(),
                    Style::default().fg(theme.ok),
                )),
                Cell::from(Span::styled(
                    worker.failed.to_string(),
                    Style::default().fg(theme.critical),
                )),
                Cell::from(Span::styled(
                    worker.pending.to_string(),
                    Style::default().fg(theme.warn),
                )),
                Cell::from(Span::styled(
                    tail_truncate(&worker.current_file, WORKER_FILE_WIDTH),
                    theme.file_style(),
                )),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(10),
        Constraint::Length(WORKER_BAR_WIDTH as u16),
        Constraint::Length(5),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Min(12),
    ];

    Table::new(rows, widths)
        .header(
            Row::new(vec!["ID", "PROGRESS", "%", "PASS", "FAIL", "PEND", "CURRENT SPEC"])
                .style(theme.header_style()),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled("Workers", theme.title_style())),
        )
}

fn log_table(title: &'static str, logs: &[(String, LogEntry)], theme: Theme) -> Table<'static> {
    let rows: Vec<Row> = logs
        .iter()
        .map(|(text, entry)| {
            Row::new(vec![
                Cell::from(Span::styled(entry.level.tag(), theme.level_style(entry.level))),
                Cell::from(format!("x{}", entry.count)),
                Cell::from(Span::styled(
                    tail_truncate(text, 100),
                    Style::default().fg(theme.text),
                )),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Length(6),
        Constraint::Min(20),
    ];

    Table::new(rows, widths)
        .header(Row::new(vec!["LEVEL", "COUNT", "MESSAGE"]).style(theme.header_style()))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(title, theme.title_style())),
        )
}

fn footer(view: &FrameView, theme: Theme) -> Paragraph<'static> {
    Paragraph::new(Line::from(vec![
        Span::styled(view.spinner.to_string(), theme.header_style()),
        Span::styled(
            format!(
                " Pipeline active | Elapsed: {}s | Press CTRL+C to abort.",
                view.elapsed.as_secs()
            ),
            Style::default().fg(theme.muted),
        ),
    ]))
}

/// Fixed-width bar of filled/empty cells, clamped to [0, 1].
pub fn progress_bar(percent: f64, width: usize) -> String {
    let clamped = percent.clamp(0.0, 1.0);
    let filled = ((clamped * width as f64) as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Keep the tail of an overlong value; the end of a path or message is the
/// diagnostic part.
pub fn tail_truncate(input: &str, max: usize) -> String {
    let count = input.chars().count();
    if count <= max {
        return input.to_string();
    }
    if max <= 3 {
        return ".".repeat(max);
    }
    let tail: String = input.chars().skip(count - (max - 3)).collect();
    format!("...{tail}")
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specpulse_core::protocol::{Event, LogLevel, SpecStatus};

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0, 4), "░░░░");
        assert_eq!(progress_bar(0.5, 4), "██░░");
        assert_eq!(progress_bar(1.0, 4), "████");
        assert_eq!(progress_bar(2.5, 4), "████");
        assert_eq!(progress_bar(-1.0, 4), "░░░░");
    }

    #[test]
    fn tail_truncate_keeps_the_suffix() {
        assert_eq!(tail_truncate("short.rb", 20), "short.rb");
        assert_eq!(
            tail_truncate("spec/models/deeply/nested/user_spec.rb", 17),
            "...d/user_spec.rb"
        );
        assert_eq!(tail_truncate("abcdef", 2), "..");
    }

    #[test]
    fn tail_truncate_is_char_safe() {
        let input = "προφίλ_spec.rb with ünïcode tail";
        let out = tail_truncate(input, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.starts_with("..."));
    }

    #[test]
    fn format_elapsed_splits_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0m 0s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10m 0s");
    }

    #[test]
    fn frame_view_caps_log_panels() {
        let store = Store::new(1);
        for i in 0..(DIAG_PANEL_ROWS + 5) {
            store.update(Event::log(LogLevel::Error, "stderr", format!("error {i}")));
        }
        for i in 0..(INFO_PANEL_ROWS + 5) {
            store.update(Event::log(LogLevel::Log, "stdout", format!("info {i}")));
        }
        let view = FrameView::capture(&store, 0);
        assert_eq!(view.diagnostics.len(), DIAG_PANEL_ROWS);
        assert_eq!(view.info.len(), INFO_PANEL_ROWS);
    }

    #[test]
    fn frame_view_spinner_wraps_around() {
        let store = Store::new(1);
        let first = FrameView::capture(&store, 0).spinner;
        let wrapped = FrameView::capture(&store, SPINNER_FRAMES.len()).spinner;
        assert_eq!(first, wrapped);
    }

    #[test]
    fn frame_view_reflects_store_state() {
        let store = Store::new(2);
        store.update(Event::Result(specpulse_core::protocol::ResultUpdate {
            worker: "2".to_string(),
            status: Some(SpecStatus::Passed),
            percent: 0.5,
            file: Some("b_spec.rb".to_string()),
        }));
        let view = FrameView::capture(&store, 0);
        assert_eq!(view.workers.len(), 2);
        assert_eq!(view.workers[0].0, "1");
        assert_eq!(view.workers[1].1.current_file, "b_spec.rb");
        assert_eq!(view.summary.passed, 1);
        assert!(view.diagnostics.is_empty());
        assert!(view.info.is_empty());
    }
}
