use thiserror::Error;

/// Main error type for the log sink
#[derive(Debug, Error)]
pub enum LogSinkError {
    // Read path errors
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Failed to read directory: {0}")]
    DirectoryRead(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // Log-related errors
    #[error("Log error: {0}")]
    LogError(String),

    #[error("Failed to open log file: {0}")]
    LogFileError(String),

    #[error("Failed to write log stream {0}: {1}")]
    WriteFailure(String, String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // IPC-related errors
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Failed to connect to daemon: {0}")]
    ConnectionError(String),

    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    #[error("Daemon not running")]
    DaemonNotRunning,

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for log sink operations
pub type Result<T> = std::result::Result<T, LogSinkError>;
