use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub const SOCKET_FILE_NAME: &str = "specpulse.sock";
pub const LOG_FILE_NAME: &str = "monitor.log";
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Resolved runtime configuration, threaded explicitly into every component.
///
/// The timing fields are tunable defaults, not invariants: the stop grace
/// window is `stop_poll_attempts * stop_poll_interval` (~1s) before the
/// supervisor escalates to a forced kill, and `finish_settle` is the window
/// left open after completion for in-flight socket messages to land.
#[derive(Clone, Debug)]
pub struct Config {
    pub artifact_dir: PathBuf,
    pub monitor_bin: Option<PathBuf>,
    pub tick_interval: Duration,
    pub finish_settle: Duration,
    pub ready_settle: Duration,
    pub stop_poll_interval: Duration,
    pub stop_poll_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve()
    }
}

impl Config {
    /// Build a config from the environment: `SPECPULSE_DIR` overrides the
    /// artifact directory, `SPECPULSE_MONITOR_BIN` overrides monitor binary
    /// resolution (otherwise `PATH` lookup applies).
    pub fn resolve() -> Self {
        Self::with_artifact_dir(resolve_artifact_dir())
    }

    pub fn with_artifact_dir(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            monitor_bin: resolve_monitor_bin(),
            tick_interval: Duration::from_millis(100),
            finish_settle: Duration::from_millis(300),
            ready_settle: Duration::from_millis(500),
            stop_poll_interval: Duration::from_millis(100),
            stop_poll_attempts: 10,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.artifact_dir.join(SOCKET_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.artifact_dir.join(LOG_FILE_NAME)
    }

    pub fn ensure_artifact_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.artifact_dir)
    }
}

fn resolve_artifact_dir() -> PathBuf {
    if let Ok(value) = env::var("SPECPULSE_DIR") {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    env::current_dir()
        .map(|cwd| cwd.join("tmp").join("specpulse"))
        .unwrap_or_else(|_| PathBuf::from("tmp/specpulse"))
}

fn resolve_monitor_bin() -> Option<PathBuf> {
    env::var("SPECPULSE_MONITOR_BIN")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}
