use logsink::logs::{
    collect_log_files, time_key, BoundaryPolicy, EventRouter, Level, LogEvent,
    MalformedLinePolicy, ReaderSettings, StreamCache, StreamKey, WindowedReader,
};
use logsink::service::LogService;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn router_in(dir: &TempDir) -> Arc<EventRouter> {
    Arc::new(EventRouter::new(Arc::new(StreamCache::new(dir.path()))))
}

#[tokio::test]
async fn test_routed_events_read_back_most_recent_first() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);

    for i in 0..5 {
        router
            .route(LogEvent::new(Level::Info, format!("request {}", i)))
            .await;
    }

    let path = router
        .cache()
        .path_for(&StreamKey::new("info", &time_key::today()));
    let window = WindowedReader::default().read(&path, None).await.unwrap();

    let messages: Vec<&str> = window
        .records
        .iter()
        .map(|r| r["msg"].as_str().unwrap())
        .collect();
    assert_eq!(
        messages,
        vec!["request 4", "request 3", "request 2", "request 1", "request 0"]
    );
    assert!(!window.truncated);
}

#[tokio::test]
async fn test_error_with_status_and_type_lands_in_three_files() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);

    router
        .route_line(r#"{"level":50,"msg":"payment failed","err":{"status":502,"type":"Gateway"}}"#)
        .await;

    let files = collect_log_files(temp_dir.path()).await.unwrap();
    let mut names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let today = time_key::today();
    let mut expected = vec![
        format!("{}.log", today),
        format!("{}_502.log", today),
        format!("{}_Gateway.log", today),
    ];
    expected.sort();
    assert_eq!(names, expected);

    let reader = WindowedReader::default();
    for file in files {
        let window = reader.read(&file, Some("error")).await.unwrap();
        assert_eq!(window.records.len(), 1);
        assert_eq!(window.records[0]["msg"], json!("payment failed"));
    }
}

#[tokio::test]
async fn test_concurrent_writers_never_interleave_lines() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);

    let mut handles = Vec::new();
    for task in 0..8 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let event = LogEvent::new(Level::Warn, "x".repeat(200))
                    .with_field("task", task)
                    .with_field("seq", i);
                router.route(event).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(router.cache().len().await, 1);

    let path = router
        .cache()
        .path_for(&StreamKey::new("warn", &time_key::today()));
    let window = WindowedReader::default().read(&path, None).await.unwrap();

    assert_eq!(window.records.len(), 200);
    assert!(window.records.iter().all(|r| r.get("parse").is_none()));
}

#[tokio::test]
async fn test_stream_recreated_after_delete() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);
    let service = LogService::new(WindowedReader::default(), Arc::clone(router.cache()), 16);

    router.route(LogEvent::new(Level::Error, "first")).await;
    let path = router
        .cache()
        .path_for(&StreamKey::new("error", &time_key::today()));
    service.delete("error").await.unwrap();
    assert!(router.cache().is_empty().await);

    router.route(LogEvent::new(Level::Error, "second")).await;

    let window = WindowedReader::default().read(&path, None).await.unwrap();
    assert_eq!(window.records.len(), 1);
    assert_eq!(window.records[0]["msg"], json!("second"));
}

#[tokio::test]
async fn test_small_window_over_routed_file() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);

    for i in 0..50 {
        router
            .route(LogEvent::new(Level::Debug, format!("line {:02}", i)))
            .await;
    }

    let path = router
        .cache()
        .path_for(&StreamKey::new("debug", &time_key::today()));
    let reader = WindowedReader::new(ReaderSettings {
        window_bytes: 300,
        max_records: 1000,
        malformed_lines: MalformedLinePolicy::Fallback,
        boundary: BoundaryPolicy::SkipPartialLine,
    });
    let window = reader.read(&path, None).await.unwrap();

    assert!(window.truncated);
    assert!(!window.records.is_empty());
    assert!(window.records.len() < 50);
    assert_eq!(window.records[0]["msg"], json!("line 49"));
    // The cut line is skipped, so nothing comes back unparsed
    assert!(window.records.iter().all(|r| r.get("parse").is_none()));
}

#[tokio::test]
async fn test_sweep_keeps_todays_streams() {
    let temp_dir = TempDir::new().unwrap();
    let router = router_in(&temp_dir);

    router.route(LogEvent::new(Level::Info, "today")).await;
    let old_key = StreamKey::new("info", "2000-01-01");
    router.cache().append(&old_key, b"{\"msg\":\"old\"}\n").await.unwrap();
    assert_eq!(router.cache().len().await, 2);

    let evicted = router.cache().evict_stale(&time_key::today()).await;
    assert_eq!(evicted, 1);
    assert!(!router.cache().contains(&old_key).await);
    assert!(router.cache().path_for(&old_key).exists());
}
