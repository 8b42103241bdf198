use crate::error::{LogSinkError, Result};
use crate::logs::{BoundaryPolicy, MalformedLinePolicy, ReaderSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log sink configuration with all settings for the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Root directory of the partitioned log tree
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Bytes scanned from the tail of a file on each read
    #[serde(default = "default_window_bytes")]
    pub window_bytes: u64,

    /// Maximum number of records returned by a single read
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// What to do with lines that are not valid JSON
    #[serde(default)]
    pub malformed_lines: MalformedLinePolicy,

    /// How to treat the line cut by the start of the read window
    #[serde(default)]
    pub boundary: BoundaryPolicy,

    /// Interval of the stale stream sweep (in seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Messages that are never written to disk
    #[serde(default = "default_skip_messages")]
    pub skip_messages: Vec<String>,

    /// Number of cached read results (0 disables the cache)
    #[serde(default = "default_result_cache_entries")]
    pub result_cache_entries: usize,

    /// Filter directive for the daemon's own diagnostics
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// Default value functions for serde
fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/logsink.sock")
}

fn default_window_bytes() -> u64 {
    200_000
}

fn default_max_records() -> usize {
    200_000
}

fn default_sweep_interval() -> u64 {
    2 * 3600
}

fn default_skip_messages() -> Vec<String> {
    vec![
        "incoming request".to_string(),
        "request completed".to_string(),
    ]
}

fn default_result_cache_entries() -> usize {
    64
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            socket_path: default_socket_path(),
            window_bytes: default_window_bytes(),
            max_records: default_max_records(),
            malformed_lines: MalformedLinePolicy::default(),
            boundary: BoundaryPolicy::default(),
            sweep_interval_secs: default_sweep_interval(),
            skip_messages: default_skip_messages(),
            result_cache_entries: default_result_cache_entries(),
            log_filter: default_log_filter(),
        }
    }
}

impl SinkConfig {
    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<SinkConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LogSinkError::ConfigError(format!("Failed to read config file: {}", e)))?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: SinkConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| LogSinkError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| LogSinkError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(LogSinkError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(LogSinkError::MissingConfigField("log_dir".to_string()));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(LogSinkError::MissingConfigField("socket_path".to_string()));
        }

        if self.window_bytes == 0 {
            return Err(LogSinkError::ConfigValidationError(
                "window_bytes must be at least 1".to_string(),
            ));
        }

        if self.max_records == 0 {
            return Err(LogSinkError::ConfigValidationError(
                "max_records must be at least 1".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(LogSinkError::ConfigValidationError(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.log_dir.exists() && !self.log_dir.is_dir() {
            return Err(LogSinkError::ConfigValidationError(format!(
                "Log directory is not a directory: {}",
                self.log_dir.display()
            )));
        }

        Ok(())
    }

    /// Expand environment variables in path fields
    fn expand_env_vars(&mut self) {
        self.log_dir = Self::expand_env_in_path(&self.log_dir);
        self.socket_path = Self::expand_env_in_path(&self.socket_path);
    }

    /// Expand environment variables in a path
    fn expand_env_in_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        PathBuf::from(expand_vars(&path_str, |name| std::env::var(name).ok()))
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reader settings derived from this configuration
    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            window_bytes: self.window_bytes,
            max_records: self.max_records,
            malformed_lines: self.malformed_lines,
            boundary: self.boundary,
        }
    }
}

/// Substitute `$NAME` and `${NAME}` using `lookup`.
///
/// A bare name runs for as long as it has `[A-Za-z0-9_]` characters, so
/// `$HOMEDIR` never expands `$HOME`. Unknown or malformed references are kept
/// verbatim.
fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        let reference = &rest[pos..pos + 1 + consumed];
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(if consumed == 0 { "$" } else { reference }),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
