use std::fs::OpenOptions;
use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use crossterm::{
    cursor, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use specpulse_core::config::{Config, DEFAULT_WORKER_COUNT};
use specpulse_core::store::Store;
use specpulse_monitor::server::{EventServer, ServerError};
use specpulse_monitor::ui::{self, report::ReportView, FrameView};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Parser, Debug)]
#[command(name = "specpulse-monitor", about = "Live dashboard for parallel test runs")]
struct Args {
    /// Declared worker slots. Non-numeric input falls back to the default.
    worker_count: Option<String>,
    /// Artifact directory (socket and log live here); overrides SPECPULSE_DIR.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum MonitorError {
    #[error("event server failed: {0}")]
    Server(#[from] ServerError),
    #[error("terminal rendering failed: {0}")]
    Terminal(#[from] io::Error),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = match args.dir {
        Some(dir) => Config::with_artifact_dir(dir),
        None => Config::resolve(),
    };
    config
        .ensure_artifact_dir()
        .with_context(|| format!("creating artifact dir {}", config.artifact_dir.display()))?;
    init_logging(&config);

    let worker_count = parse_worker_count(args.worker_count.as_deref());
    info!(
        event = "monitor_start",
        worker_count,
        socket = %config.socket_path().display()
    );
    run(&config, worker_count).await?;
    Ok(())
}

fn parse_worker_count(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_WORKER_COUNT)
}

async fn run(config: &Config, worker_count: usize) -> Result<(), MonitorError> {
    let store = Arc::new(Store::new(worker_count));
    let sink_store = store.clone();
    let mut server = EventServer::new(
        config.socket_path(),
        Arc::new(move |event| sink_store.update(event)),
    );
    server.start()?;

    let outcome = run_dashboard(config, &store).await;
    // Stopped on every path, success or unwind.
    server.stop().await;
    match &outcome {
        Ok(()) => info!(event = "monitor_done"),
        Err(err) => error!(event = "monitor_failed", error = %err),
    }
    outcome
}

async fn run_dashboard(config: &Config, store: &Store) -> Result<(), MonitorError> {
    let mut terminal = setup_terminal()?;
    match drive(config, store, &mut terminal).await {
        Ok(()) => {
            // Window for in-flight socket messages to land before the
            // final state is captured.
            tokio::time::sleep(config.finish_settle).await;
            restore_terminal(&mut terminal)?;
            let width = crossterm::terminal::size()
                .map(|(w, _)| w as usize)
                .unwrap_or(80);
            print!("{}", ui::report::render_report(&ReportView::capture(store), width));
            io::stdout().flush()?;
            Ok(())
        }
        Err(err) => {
            let _ = restore_terminal(&mut terminal);
            Err(err)
        }
    }
}

/// Render at the fixed cadence until every worker reports 100% or a
/// termination signal flips the running flag.
async fn drive(config: &Config, store: &Store, terminal: &mut Tui) -> Result<(), MonitorError> {
    let mut sigterm = signal(SignalKind::terminate()).map_err(MonitorError::Terminal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(MonitorError::Terminal)?;
    let mut ticker = tokio::time::interval(config.tick_interval);
    let mut spinner_index = 0usize;
    let mut running = true;

    while running {
        let view = FrameView::capture(store, spinner_index);
        terminal.draw(|frame| ui::render(frame, &view))?;
        spinner_index = spinner_index.wrapping_add(1);
        if store.all_finished() {
            info!(event = "run_finished", elapsed_ms = store.elapsed().as_millis() as u64);
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = sigterm.recv() => {
                info!(event = "monitor_signal", signal = "TERM");
                running = false;
            }
            _ = sigint.recv() => {
                info!(event = "monitor_signal", signal = "INT");
                running = false;
            }
        }
    }
    Ok(())
}

fn setup_terminal() -> io::Result<Tui> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Tui) -> io::Result<()> {
    let screen = execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show);
    let cursor = terminal.show_cursor();
    screen.and(cursor)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The dashboard owns stdout; log lines go to a file in the artifact dir
    // or nowhere at all.
    let writer = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
    {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(_) => BoxMakeWriter::new(io::sink),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}
