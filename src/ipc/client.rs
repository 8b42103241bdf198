// IPC client - blocking request/response over the daemon's Unix socket

use crate::error::{LogSinkError, Result};
use crate::ipc::protocol::{Command, Request, Response};
use crate::ipc::server::DEFAULT_SOCKET_PATH;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Connection attempts before giving up
const CONNECT_ATTEMPTS: u32 = 3;

const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Talks to a running daemon, one connection per command.
///
/// Only establishing the connection is retried. Once a request has been
/// written it is never sent again, since writes and deletes are not
/// idempotent.
pub struct IpcClient {
    socket_path: PathBuf,
    next_id: AtomicU64,
}

impl IpcClient {
    pub fn new() -> Self {
        Self::with_socket_path(DEFAULT_SOCKET_PATH)
    }

    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send `command` and wait for the daemon's answer
    pub fn send_command(&self, command: Command) -> Result<Response> {
        let request = Request::new(self.next_id.fetch_add(1, Ordering::SeqCst), command);
        let mut line = serde_json::to_string(&request).map_err(|e| {
            LogSinkError::SerializationError(format!("Failed to serialize request: {}", e))
        })?;
        line.push('\n');

        let stream = self.connect_with_backoff()?;
        let response = exchange(stream, &line)?;

        if response.id != request.id {
            return Err(LogSinkError::ProtocolError(format!(
                "Response ID mismatch: expected {}, got {}",
                request.id, response.id
            )));
        }

        Ok(response)
    }

    fn connect_with_backoff(&self) -> Result<UnixStream> {
        let mut attempt = 1;

        loop {
            match self.connect() {
                Ok(stream) => return Ok(stream),
                // Nobody is listening; waiting will not change that
                Err(LogSinkError::DaemonNotRunning) => return Err(LogSinkError::DaemonNotRunning),
                Err(e) if attempt >= CONNECT_ATTEMPTS => return Err(e),
                Err(_) => {
                    attempt += 1;
                    std::thread::sleep(CONNECT_BACKOFF);
                }
            }
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        if !self.socket_path.exists() {
            return Err(LogSinkError::DaemonNotRunning);
        }

        UnixStream::connect(&self.socket_path).map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => LogSinkError::DaemonNotRunning,
            _ => LogSinkError::ConnectionError(format!(
                "{}: {}",
                self.socket_path.display(),
                e
            )),
        })
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one request line and read one response line from `stream`
fn exchange<S: Read + Write>(mut stream: S, line: &str) -> Result<Response> {
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(|e| LogSinkError::IpcError(format!("Failed to send request: {}", e)))?;

    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .map_err(|e| LogSinkError::IpcError(format!("Failed to read response: {}", e)))?;

    if reply.is_empty() {
        return Err(LogSinkError::IpcError(
            "Daemon closed the connection without answering".to_string(),
        ));
    }

    serde_json::from_str(&reply).map_err(|e| {
        LogSinkError::DeserializationError(format!("Failed to deserialize response: {}", e))
    })
}
