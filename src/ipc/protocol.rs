// IPC Protocol definitions for client-daemon communication

use crate::error::LogSinkError;
use crate::service::DirEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Options for reading logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Path relative to the log root; empty for the root itself
    pub path: String,
    /// Severity name filter
    pub level: Option<String>,
    /// List a directory instead of reading it
    pub list: bool,
}

/// All available commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Route one structured event
    Write(Value),
    /// Route several events, in order
    WriteBatch(Vec<Value>),
    Read(ReadRequest),
    Delete { path: String },
    Clear,
    Status,
}

/// Coarse error class, the 404/400/500 of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

impl From<&LogSinkError> for ErrorKind {
    fn from(error: &LogSinkError) -> Self {
        match error {
            LogSinkError::NotFound(_) => ErrorKind::NotFound,
            LogSinkError::InvalidPath(_) | LogSinkError::DeserializationError(_) => {
                ErrorKind::BadRequest
            }
            _ => ErrorKind::Internal,
        }
    }
}

/// Error returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<LogSinkError> for ErrorResponse {
    fn from(error: LogSinkError) -> Self {
        Self {
            kind: ErrorKind::from(&error),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseData {
    /// Events accepted for routing
    Written { accepted: usize },
    /// Log records, most recent first
    Records(Vec<Value>),
    /// Directory listing
    Listing(Vec<DirEntry>),
    /// Path deleted
    Deleted { path: String },
    /// All logs deleted
    Cleared,
    /// Daemon status
    Status {
        uptime: Duration,
        open_streams: usize,
        log_dir: PathBuf,
    },
}

/// Request message from client to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, ErrorResponse>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: impl Into<ErrorResponse>) -> Self {
        Self {
            id,
            result: Err(error.into()),
        }
    }
}
