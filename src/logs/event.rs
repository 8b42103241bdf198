use crate::error::{LogSinkError, Result};
use crate::logs::time_key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Category used when an event carries no recognisable level
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Severity of a log event, following the numeric pino-style table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Silent,
}

impl Level {
    /// Map a numeric level to its name; only the exact table values match
    pub fn from_number(n: f64) -> Option<Level> {
        if n.is_infinite() && n > 0.0 {
            return Some(Level::Silent);
        }

        match n {
            x if x == 10.0 => Some(Level::Trace),
            x if x == 20.0 => Some(Level::Debug),
            x if x == 30.0 => Some(Level::Info),
            x if x == 40.0 => Some(Level::Warn),
            x if x == 50.0 => Some(Level::Error),
            x if x == 60.0 => Some(Level::Fatal),
            _ => None,
        }
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Level> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            "silent" | "infinity" => Some(Level::Silent),
            _ => None,
        }
    }

    /// Resolve a level from whatever a producer put in the `level` field
    pub fn from_value(value: &Value) -> Option<Level> {
        match value {
            Value::Number(n) => n.as_f64().and_then(Level::from_number),
            Value::String(s) => Level::from_name(s),
            _ => None,
        }
    }

    /// Numeric ordinal written by producers; `None` for silent (infinity)
    pub fn number(&self) -> Option<u64> {
        match self {
            Level::Trace => Some(10),
            Level::Debug => Some(20),
            Level::Info => Some(30),
            Level::Warn => Some(40),
            Level::Error => Some(50),
            Level::Fatal => Some(60),
            Level::Silent => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Silent => "silent",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event emitted by a producer, kept as its original JSON object
/// so that unknown fields survive the trip to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    fields: Map<String, Value>,
}

impl LogEvent {
    /// Build an event with a numeric level and a message
    pub fn new(level: Level, msg: impl Into<String>) -> Self {
        let mut fields = Map::new();
        let level_value = match level.number() {
            Some(n) => Value::from(n),
            None => Value::from("Infinity"),
        };
        fields.insert("level".to_string(), level_value);
        fields.insert("msg".to_string(), Value::String(msg.into()));
        Self { fields }
    }

    /// Add or replace a top-level field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach an error sub-record
    pub fn with_error(self, status: Option<Value>, error_type: Option<&str>) -> Self {
        let mut err = Map::new();
        if let Some(status) = status {
            err.insert("status".to_string(), status);
        }
        if let Some(error_type) = error_type {
            err.insert("type".to_string(), Value::String(error_type.to_string()));
        }
        self.with_field("err", Value::Object(err))
    }

    /// Wrap a JSON value; only objects are events
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(LogSinkError::DeserializationError(format!(
                "Log event must be a JSON object, got: {}",
                other
            ))),
        }
    }

    /// Parse one newline-delimited JSON event
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            LogSinkError::DeserializationError(format!("Failed to parse log event: {}", e))
        })?;
        Self::from_value(value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn level(&self) -> Option<Level> {
        self.fields.get("level").and_then(Level::from_value)
    }

    pub fn message(&self) -> Option<&str> {
        self.fields.get("msg").and_then(Value::as_str)
    }

    /// Explicit category override, looked up in an object-valued `msg` first
    pub fn category_override(&self) -> Option<&str> {
        let nested = self
            .fields
            .get("msg")
            .and_then(|msg| msg.get("logfolder"))
            .and_then(Value::as_str);

        nested
            .or_else(|| self.fields.get("logfolder").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }

    /// Base category: override if present, else the severity name
    pub fn category(&self) -> String {
        match self.category_override() {
            Some(folder) => folder.to_string(),
            None => self
                .level()
                .map(|l| l.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
        }
    }

    /// `err.status` rendered as a literal (numbers and non-empty strings)
    pub fn error_status(&self) -> Option<String> {
        self.error_field("status")
    }

    /// `err.type` rendered as a literal
    pub fn error_type(&self) -> Option<String> {
        self.error_field("type")
    }

    fn error_field(&self, name: &str) -> Option<String> {
        match self.fields.get("err")?.get(name)? {
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Stamp the event with the local-offset timestamp unless it has one
    pub fn ensure_timestamp(&mut self) {
        if !self.fields.contains_key("time") {
            self.fields
                .insert("time".to_string(), Value::String(time_key::local_timestamp()));
        }
    }

    /// The persisted record: original fields with `level` resolved to its name.
    /// Unknown levels are kept as the producer sent them.
    pub fn to_record(&self) -> Value {
        let mut record = self.fields.clone();
        if let Some(level) = self.level() {
            record.insert("level".to_string(), Value::String(level.as_str().to_string()));
        }
        Value::Object(record)
    }

    /// Serialized record followed by the line terminator
    pub fn to_record_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(&self.to_record()).map_err(|e| {
            LogSinkError::SerializationError(format!("Failed to serialize log record: {}", e))
        })?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_table() {
        assert_eq!(Level::from_number(10.0), Some(Level::Trace));
        assert_eq!(Level::from_number(30.0), Some(Level::Info));
        assert_eq!(Level::from_number(60.0), Some(Level::Fatal));
        assert_eq!(Level::from_number(f64::INFINITY), Some(Level::Silent));
        assert_eq!(Level::from_number(35.0), None);
        assert_eq!(Level::from_value(&json!("WARN")), Some(Level::Warn));
        assert_eq!(Level::from_value(&json!("Infinity")), Some(Level::Silent));
        assert_eq!(Level::from_value(&json!(null)), None);
    }

    #[test]
    fn test_category_from_level() {
        let event = LogEvent::parse(r#"{"level":40,"msg":"careful"}"#).unwrap();
        assert_eq!(event.category(), "warn");
        assert_eq!(event.message(), Some("careful"));
    }

    #[test]
    fn test_category_override_nested_first() {
        let event = LogEvent::parse(
            r#"{"level":30,"logfolder":"outer","msg":{"logfolder":"payments"}}"#,
        )
        .unwrap();
        assert_eq!(event.category(), "payments");

        let event = LogEvent::parse(r#"{"level":30,"logfolder":"audit","msg":"x"}"#).unwrap();
        assert_eq!(event.category(), "audit");
    }

    #[test]
    fn test_unknown_level_category() {
        let event = LogEvent::parse(r#"{"level":35,"msg":"custom"}"#).unwrap();
        assert_eq!(event.category(), UNKNOWN_CATEGORY);
        assert_eq!(event.to_record()["level"], json!(35));
    }

    #[test]
    fn test_error_fields() {
        let event = LogEvent::new(Level::Error, "upstream failed")
            .with_error(Some(json!(503)), Some("UpstreamTimeout"));
        assert_eq!(event.error_status().as_deref(), Some("503"));
        assert_eq!(event.error_type().as_deref(), Some("UpstreamTimeout"));

        let event = LogEvent::parse(r#"{"level":50,"err":{"status":"","type":null}}"#).unwrap();
        assert_eq!(event.error_status(), None);
        assert_eq!(event.error_type(), None);
    }

    #[test]
    fn test_record_resolves_level_name() {
        let event = LogEvent::new(Level::Info, "hello").with_field("reqId", 7);
        let record = event.to_record();
        assert_eq!(record["level"], json!("info"));
        assert_eq!(record["reqId"], json!(7));

        let line = event.to_record_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_ensure_timestamp_keeps_existing() {
        let mut event = LogEvent::new(Level::Info, "hello").with_field("time", "2024-01-01T00:00:00Z");
        event.ensure_timestamp();
        assert_eq!(event.fields()["time"], json!("2024-01-01T00:00:00Z"));

        let mut event = LogEvent::new(Level::Info, "hello");
        event.ensure_timestamp();
        assert!(event.fields().contains_key("time"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            LogEvent::parse("[1,2,3]"),
            Err(LogSinkError::DeserializationError(_))
        ));
        assert!(LogEvent::parse("not json").is_err());
    }
}
