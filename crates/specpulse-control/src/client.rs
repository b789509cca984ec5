use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use specpulse_core::config::Config;
use specpulse_core::protocol::{Event, LogLevel, LogRecord, ResultUpdate, SpecStatus};
use tracing::debug;

/// Fire-and-forget sender for the monitor socket: one short-lived connection
/// per message, errors swallowed. Delivery is best-effort; if the monitor is
/// not listening, the message is simply lost.
#[derive(Clone, Debug)]
pub struct ReportClient {
    socket_path: PathBuf,
}

impl ReportClient {
    pub fn new(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path(),
        }
    }

    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn report_result(
        &self,
        worker: &str,
        status: SpecStatus,
        percent: f64,
        file: Option<&str>,
    ) {
        self.send(&Event::Result(ResultUpdate {
            worker: worker.to_string(),
            status: Some(status),
            percent,
            file: file.map(str::to_string),
        }));
    }

    pub fn report_log(&self, level: LogLevel, stream: &str, message: &str) {
        self.send(&Event::Log(LogRecord {
            level,
            stream: stream.to_string(),
            message: message.to_string(),
        }));
    }

    pub fn send(&self, event: &Event) {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(err) => {
                debug!(event = "report_encode_failed", error = %err);
                return;
            }
        };
        if let Err(err) = self.send_line(&line) {
            debug!(
                event = "report_send_failed",
                socket = %self.socket_path.display(),
                error = %err
            );
        }
    }

    fn send_line(&self, line: &str) -> io::Result<()> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.write_all(line.as_bytes())?;
        Ok(())
    }
}
