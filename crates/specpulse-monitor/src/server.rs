use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use specpulse_core::protocol::{self, Event};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback every decoded message is forwarded to. The server knows nothing
/// about the store beyond this contract.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Unix-socket ingestion server for newline-delimited JSON messages.
///
/// The accept loop and every connection handler run as their own tasks; all
/// of them funnel into the injected [`EventSink`]. `stop` flips a watch
/// channel, joins the accept loop, and unlinks the socket file.
pub struct EventServer {
    socket_path: PathBuf,
    sink: EventSink,
    shutdown: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
}

impl EventServer {
    pub fn new(socket_path: PathBuf, sink: EventSink) -> Self {
        Self {
            socket_path,
            sink,
            shutdown: None,
            accept_task: None,
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Bind the endpoint (removing any stale socket left by a prior run) and
    /// start accepting in the background. Calling `start` on a running
    /// server is a no-op.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.accept_task.is_some() {
            return Ok(());
        }

        match fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(
                event = "server_stale_socket_removed",
                socket = %self.socket_path.display()
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(ServerError::StaleSocket {
                    path: self.socket_path.display().to_string(),
                    source: err,
                })
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|err| ServerError::Bind {
            path: self.socket_path.display().to_string(),
            source: err,
        })?;

        let (tx, rx) = watch::channel(false);
        let sink = self.sink.clone();
        self.accept_task = Some(tokio::spawn(accept_loop(listener, rx, sink)));
        self.shutdown = Some(tx);
        info!(event = "server_start", socket = %self.socket_path.display());
        Ok(())
    }

    /// Stop accepting, wait for the accept loop to exit, and remove the
    /// endpoint file. Idempotent; safe when `start` was never called or the
    /// socket is already gone.
    pub async fn stop(&mut self) {
        let was_running = self.accept_task.is_some();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }
        let _ = fs::remove_file(&self.socket_path);
        if was_running {
            info!(event = "server_stop", socket = %self.socket_path.display());
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    mut shutdown: watch::Receiver<bool>,
    sink: EventSink,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _addr)) => {
                        let sink = sink.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, sink).await;
                        });
                    }
                    Err(err) => {
                        // Accept failures during shutdown are expected; any
                        // other error leaves the server unusable until a
                        // fresh start().
                        if *shutdown.borrow() {
                            break;
                        }
                        warn!(event = "server_accept_error", error = %err);
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, sink: EventSink) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match protocol::decode_line(&line) {
                    Ok(event) => sink(event),
                    Err(err) => debug!(event = "server_line_dropped", error = %err),
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(event = "server_read_error", error = %err);
                break;
            }
        }
    }
}
