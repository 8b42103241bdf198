use crate::error::{LogSinkError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Extension of every partition file
pub const LOG_EXTENSION: &str = ".log";

/// Identifies one physical log file: `<category>/<day>[_<suffix>].log`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub category: String,
    pub day: String,
    pub suffix: Option<String>,
}

impl StreamKey {
    /// Create a primary key; the category is reduced to a single path segment
    pub fn new(category: &str, day: &str) -> Self {
        Self {
            category: sanitize_segment(category),
            day: sanitize_segment(day),
            suffix: None,
        }
    }

    /// Turn this key into an auxiliary key carrying `suffix`
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(sanitize_segment(suffix));
        self
    }

    pub fn file_name(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}_{}{}", self.day, suffix, LOG_EXTENSION),
            None => format!("{}{}", self.day, LOG_EXTENSION),
        }
    }

    /// Path of the partition relative to the log root
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.category).join(self.file_name())
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "{}/{}_{}", self.category, self.day, suffix),
            None => write!(f, "{}/{}", self.category, self.day),
        }
    }
}

/// Reduce producer-controlled text to one safe path segment
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// One open append-mode file for a stream key
struct StreamHandle {
    path: PathBuf,
    file: File,
    closed: bool,
}

impl StreamHandle {
    async fn open(root: &Path, key: &StreamKey) -> Result<Self> {
        let path = root.join(key.relative_path());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LogSinkError::LogError(format!("Failed to create log directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                LogSinkError::LogFileError(format!("{}: {}", path.display(), e))
            })?;

        debug!("Opened log stream {} at {}", key, path.display());

        Ok(Self {
            path,
            file,
            closed: false,
        })
    }

    /// Append one record; the flush waits for the write to reach the file so
    /// readers see it. A failure leaves the handle closed.
    async fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut result = self.file.write_all(data).await;
        if result.is_ok() {
            result = self.file.flush().await;
        }

        if result.is_err() {
            self.closed = true;
        }
        result
    }

    async fn close(mut self) {
        if !self.closed {
            if let Err(e) = self.file.flush().await {
                warn!("Failed to flush log stream {}: {}", self.path.display(), e);
            }
        }
        self.closed = true;
    }
}

/// Owns the open partition files, at most one per stream key.
///
/// The map lock is held across handle creation and the append itself, so a
/// miss followed by an insert can never race with another writer of the same
/// key and same-key writes land in call order.
pub struct StreamCache {
    root: PathBuf,
    handles: Mutex<HashMap<StreamKey, StreamHandle>>,
}

impl StreamCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Root directory of the partition tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the file backing `key`
    pub fn path_for(&self, key: &StreamKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Ensure a live handle exists for `key`, creating file and directories
    /// on a miss. Returns the file path.
    pub async fn get_or_create(&self, key: &StreamKey) -> Result<PathBuf> {
        let mut handles = self.handles.lock().await;
        let handle = Self::acquire(&mut handles, &self.root, key).await?;
        Ok(handle.path.clone())
    }

    /// Append one serialized record to the stream for `key`.
    ///
    /// On an I/O error the handle is destroyed, so the next append for the
    /// same key starts over with a fresh file handle.
    pub async fn append(&self, key: &StreamKey, data: &[u8]) -> Result<()> {
        let mut handles = self.handles.lock().await;
        let handle = Self::acquire(&mut handles, &self.root, key).await?;

        if let Err(e) = handle.append(data).await {
            if let Some(handle) = handles.remove(key) {
                handle.close().await;
            }
            return Err(LogSinkError::WriteFailure(key.to_string(), e.to_string()));
        }

        Ok(())
    }

    async fn acquire<'a>(
        handles: &'a mut HashMap<StreamKey, StreamHandle>,
        root: &Path,
        key: &StreamKey,
    ) -> Result<&'a mut StreamHandle> {
        // Deleted files are evicted by whoever deletes them, so a live entry
        // only needs replacing after a failed write
        if handles.get(key).is_some_and(|handle| handle.closed) {
            if let Some(handle) = handles.remove(key) {
                debug!("Replacing closed log stream {}", key);
                handle.close().await;
            }
        }

        if !handles.contains_key(key) {
            let handle = StreamHandle::open(root, key).await?;
            handles.insert(key.clone(), handle);
        }

        handles
            .get_mut(key)
            .ok_or_else(|| LogSinkError::Internal(format!("Log stream {} vanished", key)))
    }

    /// Destroy and drop every handle whose key matches `predicate`
    pub async fn evict<F>(&self, predicate: F) -> usize
    where
        F: Fn(&StreamKey) -> bool,
    {
        let mut handles = self.handles.lock().await;
        let doomed: Vec<StreamKey> = handles.keys().filter(|k| predicate(k)).cloned().collect();

        for key in &doomed {
            if let Some(handle) = handles.remove(key) {
                handle.close().await;
            }
        }

        if !doomed.is_empty() {
            debug!("Evicted {} log streams", doomed.len());
        }
        doomed.len()
    }

    /// Drop handles whose day is not `today`
    pub async fn evict_stale(&self, today: &str) -> usize {
        self.evict(|key| key.day != today).await
    }

    /// Drop handles whose file lies under `path` (used when logs are deleted)
    pub async fn evict_under(&self, path: &Path) -> usize {
        let root = self.root.clone();
        self.evict(move |key| root.join(key.relative_path()).starts_with(path))
            .await
    }

    /// Drop every handle
    pub async fn clear(&self) -> usize {
        self.evict(|_| true).await
    }

    /// Flush all open handles
    pub async fn flush_all(&self) -> Result<()> {
        let mut handles = self.handles.lock().await;
        for (key, handle) in handles.iter_mut() {
            handle.file.flush().await.map_err(|e| {
                LogSinkError::WriteFailure(key.to_string(), format!("flush failed: {}", e))
            })?;
        }
        Ok(())
    }

    pub async fn contains(&self, key: &StreamKey) -> bool {
        self.handles.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stream_key_paths() {
        let key = StreamKey::new("error", "2024-05-01");
        assert_eq!(key.file_name(), "2024-05-01.log");
        assert_eq!(key.relative_path(), PathBuf::from("error/2024-05-01.log"));

        let key = key.with_suffix("503");
        assert_eq!(key.file_name(), "2024-05-01_503.log");
        assert_eq!(key.to_string(), "error/2024-05-01_503");
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("payments"), "payments");
        assert_eq!(sanitize_segment("../../etc"), ".._.._etc");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment(""), "_");
        assert_eq!(sanitize_segment("a/b c"), "a_b_c");
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());
        let key = StreamKey::new("info", "2024-05-01");

        let first = cache.get_or_create(&key).await.unwrap();
        let second = cache.get_or_create(&key).await.unwrap();

        assert_eq!(first, second);
        assert!(first.exists());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());
        let key = StreamKey::new("info", "2024-05-01");

        cache.append(&key, b"one\n").await.unwrap();
        cache.append(&key, b"two\n").await.unwrap();
        cache.append(&key, b"three\n").await.unwrap();

        let content = tokio::fs::read_to_string(cache.path_for(&key)).await.unwrap();
        assert_eq!(content, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_append_after_evict_under_recreates_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());
        let key = StreamKey::new("warn", "2024-05-01");

        cache.append(&key, b"before\n").await.unwrap();
        let dir = temp_dir.path().join("warn");
        assert_eq!(cache.evict_under(&dir).await, 1);
        tokio::fs::remove_dir_all(&dir).await.unwrap();

        cache.append(&key, b"after\n").await.unwrap();

        let content = tokio::fs::read_to_string(cache.path_for(&key)).await.unwrap();
        assert_eq!(content, "after\n");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_keeps_handle_without_eviction() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());
        let key = StreamKey::new("info", "2024-05-01");

        cache.append(&key, b"one\n").await.unwrap();
        tokio::fs::remove_file(cache.path_for(&key)).await.unwrap();

        // No stat per write: the open handle is reused until someone evicts it
        cache.append(&key, b"two\n").await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(!cache.path_for(&key).exists());
    }

    #[tokio::test]
    async fn test_evict_stale() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());

        cache.get_or_create(&StreamKey::new("info", "2024-05-01")).await.unwrap();
        cache.get_or_create(&StreamKey::new("info", "2024-05-02")).await.unwrap();
        cache
            .get_or_create(&StreamKey::new("error", "2024-05-02").with_suffix("500"))
            .await
            .unwrap();

        let evicted = cache.evict_stale("2024-05-02").await;
        assert_eq!(evicted, 1);
        assert_eq!(cache.len().await, 2);
        assert!(!cache.contains(&StreamKey::new("info", "2024-05-01")).await);
    }

    #[tokio::test]
    async fn test_evict_under_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StreamCache::new(temp_dir.path());

        cache.get_or_create(&StreamKey::new("info", "2024-05-01")).await.unwrap();
        cache.get_or_create(&StreamKey::new("error", "2024-05-01")).await.unwrap();

        let evicted = cache.evict_under(&temp_dir.path().join("error")).await;
        assert_eq!(evicted, 1);
        assert!(cache.contains(&StreamKey::new("info", "2024-05-01")).await);

        assert_eq!(cache.clear().await, 1);
        assert!(cache.is_empty().await);
    }
}
