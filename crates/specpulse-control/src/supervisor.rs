use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Command;
use std::thread;

use specpulse_core::config::Config;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Pid = i32;

const MONITOR_BIN: &str = "specpulse-monitor";
const CURSOR_SHOW: &str = "\x1b[?25h";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create artifact dir {path}: {source}")]
    ArtifactDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch monitor binary {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },
}

/// Handle to a detached monitor process.
///
/// Dropping the handle without calling [`MonitorHandle::stop`] is the
/// exit-time safety net: the child is signalled to terminate and cursor
/// visibility is restored, so an unwinding caller never strands the monitor
/// or a hidden cursor.
#[derive(Debug)]
pub struct MonitorHandle {
    pid: Pid,
    config: Config,
    stopped: bool,
}

impl MonitorHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Graceful stop with bounded escalation; see [`stop_monitor`].
    pub fn stop(mut self) {
        self.stopped = true;
        stop_monitor(Some(self.pid), &self.config);
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        send_signal(self.pid, libc::SIGTERM);
        show_cursor();
    }
}

/// Launch the monitor as a detached OS process and return immediately.
///
/// Binding happens asynchronously in the child; callers should allow
/// `config.ready_settle` before relying on the socket being reachable.
pub fn start_monitor(worker_count: usize, config: &Config) -> Result<MonitorHandle, SupervisorError> {
    config
        .ensure_artifact_dir()
        .map_err(|err| SupervisorError::ArtifactDir {
            path: config.artifact_dir.display().to_string(),
            source: err,
        })?;

    let bin = config
        .monitor_bin
        .clone()
        .unwrap_or_else(|| PathBuf::from(MONITOR_BIN));
    let child = Command::new(&bin)
        .arg(worker_count.to_string())
        .arg("--dir")
        .arg(&config.artifact_dir)
        .spawn()
        .map_err(|err| SupervisorError::Spawn {
            bin: bin.display().to_string(),
            source: err,
        })?;

    let pid = child.id() as Pid;
    info!(event = "monitor_spawned", pid, worker_count, bin = %bin.display());
    Ok(MonitorHandle {
        pid,
        config: config.clone(),
        stopped: false,
    })
}

/// Stop a monitor process: probe, signal TERM, poll for exit through the
/// grace window (`stop_poll_attempts` x `stop_poll_interval`), then escalate
/// to SIGKILL and reap. Cursor visibility is restored on every path.
/// `stop_monitor(None, ..)` is a no-op.
pub fn stop_monitor(pid: Option<Pid>, config: &Config) {
    let Some(pid) = pid else {
        return;
    };
    if pid <= 0 {
        show_cursor();
        return;
    }

    if process_gone(pid) {
        debug!(event = "monitor_already_stopped", pid);
        show_cursor();
        return;
    }

    send_signal(pid, libc::SIGTERM);
    for _ in 0..config.stop_poll_attempts {
        thread::sleep(config.stop_poll_interval);
        if process_gone(pid) {
            info!(event = "monitor_stopped", pid);
            show_cursor();
            return;
        }
    }

    warn!(event = "monitor_stop_escalated", pid);
    send_signal(pid, libc::SIGKILL);
    reap(pid);
    show_cursor();
}

/// Start the monitor, run `f` with it live, and always stop it afterwards.
/// The settle windows around `f` give the child time to bind the socket and
/// the last messages time to land.
pub fn with_monitor<T>(
    worker_count: usize,
    config: &Config,
    f: impl FnOnce() -> T,
) -> Result<T, SupervisorError> {
    let handle = start_monitor(worker_count, config)?;
    thread::sleep(config.ready_settle);
    let output = f();
    thread::sleep(config.ready_settle);
    handle.stop();
    Ok(output)
}

/// True once the process no longer exists. An exited child is reaped here:
/// `kill(pid, 0)` alone keeps reporting a zombie child as alive.
fn process_gone(pid: Pid) -> bool {
    let mut status = 0;
    let reaped = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    if reaped == pid {
        return true;
    }
    unsafe {
        libc::kill(pid, 0) != 0
            && io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
    }
}

fn send_signal(pid: Pid, signal: libc::c_int) {
    // Failure means the process is already gone; that is the goal state.
    let _ = unsafe { libc::kill(pid, signal) };
}

fn reap(pid: Pid) {
    let mut status = 0;
    let _ = unsafe { libc::waitpid(pid, &mut status, 0) };
}

fn show_cursor() {
    print!("{CURSOR_SHOW}");
    let _ = io::stdout().flush();
}
