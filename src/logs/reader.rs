use crate::error::{LogSinkError, Result};
use crate::logs::event::Level;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::debug;

/// Default number of bytes scanned from the tail of a file
pub const DEFAULT_WINDOW_BYTES: u64 = 200_000;

/// Default cap on records returned by one read
pub const DEFAULT_MAX_RECORDS: usize = 200_000;

/// What to do with a line that is not a JSON object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Keep the raw text as `{msg, level: "error", parse: false}`
    #[default]
    Fallback,
    /// Drop the line
    Discard,
}

/// How to treat the line cut by the start of the read window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Parse the cut line like any other
    Keep,
    /// Drop the oldest surviving record when the window truncated the file
    DropOldest,
    /// Skip bytes up to the first newline when the window starts mid-line
    #[default]
    SkipPartialLine,
}

/// Limits and policies applied by [`WindowedReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    pub window_bytes: u64,
    pub max_records: usize,
    pub malformed_lines: MalformedLinePolicy,
    pub boundary: BoundaryPolicy,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            window_bytes: DEFAULT_WINDOW_BYTES,
            max_records: DEFAULT_MAX_RECORDS,
            malformed_lines: MalformedLinePolicy::default(),
            boundary: BoundaryPolicy::default(),
        }
    }
}

/// Result of one windowed read, records most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadWindow {
    pub records: Vec<Value>,
    pub file_size: u64,
    pub start_offset: u64,
    pub truncated: bool,
}

/// First byte of the scan window for a file of `size` bytes
pub fn start_offset(size: u64, window_bytes: u64) -> u64 {
    size.saturating_sub(window_bytes)
}

/// Record standing in for a line that failed to parse
pub fn fallback_record(raw: &str) -> Value {
    json!({ "msg": raw, "level": "error", "parse": false })
}

/// Decode one raw line: drop the terminator and every NUL byte
pub fn clean_line(raw: &[u8]) -> String {
    let mut bytes: Vec<u8> = raw.iter().copied().filter(|b| *b != 0).collect();
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Case-insensitive level equality. With a filter set, records without a
/// level never match; without one everything matches.
pub fn matches_level(record: &Value, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    match record.get("level") {
        Some(Value::String(name)) => name.eq_ignore_ascii_case(filter),
        Some(other) => Level::from_value(other)
            .is_some_and(|level| level.as_str().eq_ignore_ascii_case(filter)),
        None => false,
    }
}

/// Tails newline-delimited JSON files within a fixed byte window
#[derive(Debug, Clone, Default)]
pub struct WindowedReader {
    settings: ReaderSettings,
}

impl WindowedReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Read the most recent records of a regular file
    ///
    /// # Arguments
    /// * `path` - File to read
    /// * `level` - Optional severity name to keep
    ///
    /// # Returns
    /// * `Ok(ReadWindow)` - Records most recent first, at most `max_records`
    /// * `Err(LogSinkError)` - The file could not be opened or read
    pub async fn read(&self, path: &Path, level: Option<&str>) -> Result<ReadWindow> {
        let mut file = File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogSinkError::NotFound(path.display().to_string())
            } else {
                LogSinkError::LogFileError(format!("{}: {}", path.display(), e))
            }
        })?;

        let file_size = file
            .metadata()
            .await
            .map_err(|e| LogSinkError::LogFileError(format!("{}: {}", path.display(), e)))?
            .len();

        let start = start_offset(file_size, self.settings.window_bytes);
        let truncated = start > 0;

        // Starting one byte early lets the skipped segment be just the previous
        // line's terminator when the window happens to start on a line boundary.
        let skip_partial = truncated && self.settings.boundary == BoundaryPolicy::SkipPartialLine;
        let seek_to = if skip_partial { start - 1 } else { start };

        if seek_to > 0 {
            file.seek(SeekFrom::Start(seek_to))
                .await
                .map_err(|e| LogSinkError::LogError(format!("Failed to seek in log file: {}", e)))?;
        }

        let mut reader = BufReader::new(file).take(file_size - seek_to);
        let mut buf = Vec::new();

        if skip_partial {
            reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| LogSinkError::LogError(format!("Failed to read log line: {}", e)))?;
        }

        let mut records = Vec::new();

        while records.len() < self.settings.max_records {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| LogSinkError::LogError(format!("Failed to read log line: {}", e)))?;
            if n == 0 {
                break;
            }

            // An empty interior line is malformed like any other unparsable one
            let line = clean_line(&buf);

            match serde_json::from_str::<Value>(&line) {
                Ok(value) if value.is_object() => {
                    if matches_level(&value, level) {
                        records.push(value);
                    }
                }
                // Fallback records bypass the level filter
                Ok(_) | Err(_) => match self.settings.malformed_lines {
                    MalformedLinePolicy::Fallback => records.push(fallback_record(&line)),
                    MalformedLinePolicy::Discard => {
                        debug!("Discarding malformed line in {}", path.display());
                    }
                },
            }
        }

        // Closing early: nothing past the cap is scanned
        drop(reader);

        records.reverse();

        if truncated && self.settings.boundary == BoundaryPolicy::DropOldest && records.len() > 1 {
            records.pop();
        }

        Ok(ReadWindow {
            records,
            file_size,
            start_offset: start,
            truncated,
        })
    }
}

fn record_time(record: &Value) -> Option<DateTime<FixedOffset>> {
    record
        .get("time")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
}

/// Merge per-file results into one most-recent-first list capped at `max`.
///
/// Records carrying a parseable `time` come first, newest first; the rest
/// follow in their original order.
pub fn merge_most_recent(windows: Vec<Vec<Value>>, max: usize) -> Vec<Value> {
    let mut merged: Vec<Value> = windows.into_iter().flatten().collect();

    merged.sort_by(|a, b| match (record_time(a), record_time(b)) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    merged.truncate(max);
    merged
}
