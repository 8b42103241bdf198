use crate::logs::event::{Level, LogEvent};
use serde_json::{Map, Number, Value};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Events from the sink's own write path are not fed back into it
const INTERNAL_TARGET: &str = "logsink::logs";

/// Map a tracing level onto the sink's severity table
pub fn level_from_tracing(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Trace,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::ERROR => Level::Error,
    }
}

/// A tracing Layer that turns every event into a [`LogEvent`] and hands it to
/// the router's ingest channel.
///
/// Fields named `status` and `error_type` become `err.status` / `err.type`,
/// `logfolder` overrides the category, everything else is copied as-is.
#[derive(Clone)]
pub struct SinkLayer {
    sender: UnboundedSender<LogEvent>,
}

impl SinkLayer {
    pub fn new(sender: UnboundedSender<LogEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let log_event = visitor.into_event(level_from_tracing(metadata.level()), metadata.target());

        // The ingest task is gone during shutdown; nothing left to do then
        let _ = self.sender.send(log_event);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
    err: Map<String, Value>,
}

impl FieldVisitor {
    fn put(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            "status" => {
                self.err.insert("status".to_string(), value);
            }
            "error_type" => {
                self.err.insert("type".to_string(), value);
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    fn into_event(self, level: Level, target: &str) -> LogEvent {
        let mut event = LogEvent::new(level, self.message.unwrap_or_default())
            .with_field("target", target)
            .with_field("pid", std::process::id());

        for (key, value) in self.fields {
            event = event.with_field(key, value);
        }

        if !self.err.is_empty() {
            event = event.with_field("err", Value::Object(self.err));
        }

        event
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}
