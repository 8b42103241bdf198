use crate::error::Result;
use crate::logs::event::LogEvent;
use crate::logs::stream_cache::{StreamCache, StreamKey};
use crate::logs::time_key;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where a copy of an event goes, relative to its base category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// `<category>/<day>.log`
    Primary,
    /// `<category>/<day>_<status>.log`
    Status(String),
    /// `<category>/<day>_<type>.log`
    ErrorType(String),
}

impl RouteTarget {
    pub fn key(&self, category: &str, day: &str) -> StreamKey {
        let key = StreamKey::new(category, day);
        match self {
            RouteTarget::Primary => key,
            RouteTarget::Status(status) => key.with_suffix(status),
            RouteTarget::ErrorType(error_type) => key.with_suffix(error_type),
        }
    }
}

/// Classify an event into its targets: auxiliary buckets first, primary last
pub fn classify(event: &LogEvent) -> Vec<RouteTarget> {
    let mut targets = Vec::with_capacity(3);

    if let Some(status) = event.error_status() {
        targets.push(RouteTarget::Status(status));
    }
    if let Some(error_type) = event.error_type() {
        targets.push(RouteTarget::ErrorType(error_type));
    }
    targets.push(RouteTarget::Primary);

    targets
}

/// Routes structured events into per-category, per-day partition files
pub struct EventRouter {
    cache: Arc<StreamCache>,
    skip_messages: Vec<String>,
}

impl EventRouter {
    pub fn new(cache: Arc<StreamCache>) -> Self {
        Self {
            cache,
            skip_messages: Vec::new(),
        }
    }

    /// Messages that are dropped instead of written
    pub fn with_skip_messages(mut self, skip_messages: Vec<String>) -> Self {
        self.skip_messages = skip_messages;
        self
    }

    pub fn cache(&self) -> &Arc<StreamCache> {
        &self.cache
    }

    pub fn should_skip(&self, event: &LogEvent) -> bool {
        event
            .message()
            .is_some_and(|msg| self.skip_messages.iter().any(|skip| skip == msg))
    }

    /// Distinct stream keys an event is written to on `day`
    pub fn target_keys(&self, event: &LogEvent, day: &str) -> Vec<StreamKey> {
        let category = event.category();
        let mut keys: Vec<StreamKey> = Vec::with_capacity(3);

        for target in classify(event) {
            let key = target.key(&category, day);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        keys
    }

    /// Write an event to every target stream.
    ///
    /// Failures are logged and swallowed: a producer must never be taken
    /// down by its own logging.
    pub async fn route(&self, mut event: LogEvent) {
        if self.should_skip(&event) {
            return;
        }

        event.ensure_timestamp();

        let line = match event.to_record_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping log event: {}", e);
                return;
            }
        };

        for key in self.target_keys(&event, &time_key::today()) {
            if let Err(e) = self.cache.append(&key, line.as_bytes()).await {
                warn!("{}", e);
            }
        }
    }

    /// Parse a raw JSON line and route it; invalid lines are logged and dropped
    pub async fn route_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        match LogEvent::parse(line) {
            Ok(event) => self.route(event).await,
            Err(e) => warn!("Dropping log line: {}", e),
        }
    }

    /// Flush every open stream
    pub async fn flush(&self) -> Result<()> {
        self.cache.flush_all().await
    }
}

/// Spawn the periodic sweep that closes streams of past days
pub fn spawn_sweeper(cache: Arc<StreamCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = cache.evict_stale(&time_key::today()).await;
            debug!("Stale stream sweep evicted {} handles", evicted);
        }
    })
}

/// Spawn a task draining a channel into the router, for producers that must
/// not wait on disk I/O. Events are written in the order they were sent.
pub fn spawn_ingest(router: Arc<EventRouter>) -> (mpsc::UnboundedSender<LogEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<LogEvent>();

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            router.route(event).await;
        }
    });

    (tx, handle)
}
