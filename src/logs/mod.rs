// Logs module - Event routing into day partitions and windowed tail reads

mod collector;
mod event;
mod layer;
mod reader;
mod router;
mod stream_cache;
pub mod time_key;

pub use collector::{collect_log_files, SKIPPED_DIRS};
pub use event::{Level, LogEvent, UNKNOWN_CATEGORY};
pub use layer::{level_from_tracing, SinkLayer};
pub use reader::{
    clean_line, fallback_record, matches_level, merge_most_recent, start_offset, BoundaryPolicy,
    MalformedLinePolicy, ReadWindow, ReaderSettings, WindowedReader, DEFAULT_MAX_RECORDS,
    DEFAULT_WINDOW_BYTES,
};
pub use router::{classify, spawn_ingest, spawn_sweeper, EventRouter, RouteTarget};
pub use stream_cache::{sanitize_segment, StreamCache, StreamKey, LOG_EXTENSION};
