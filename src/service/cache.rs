use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    level: Option<String>,
}

impl CacheKey {
    fn new(path: &Path, level: Option<&str>) -> Self {
        Self {
            path: path.to_path_buf(),
            level: level.map(str::to_ascii_lowercase),
        }
    }
}

struct CachedRead {
    size: u64,
    modified: Option<SystemTime>,
    records: Vec<Value>,
    stamp: u64,
}

/// Cache of file read results.
///
/// An entry is only served while the file still has the size and mtime it had
/// when the entry was stored, so appends invalidate it without bookkeeping.
pub struct ResultCache {
    capacity: usize,
    entries: RwLock<HashMap<CacheKey, CachedRead>>,
    clock: AtomicU64,
}

impl ResultCache {
    /// A capacity of 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub async fn get(
        &self,
        path: &Path,
        level: Option<&str>,
        size: u64,
        modified: Option<SystemTime>,
    ) -> Option<Vec<Value>> {
        let entries = self.entries.read().await;
        entries
            .get(&CacheKey::new(path, level))
            .filter(|cached| cached.size == size && cached.modified == modified)
            .map(|cached| cached.records.clone())
    }

    pub async fn insert(
        &self,
        path: &Path,
        level: Option<&str>,
        size: u64,
        modified: Option<SystemTime>,
        records: Vec<Value>,
    ) {
        if !self.is_enabled() {
            return;
        }

        let key = CacheKey::new(path, level);
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.stamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CachedRead {
                size,
                modified,
                records,
                stamp,
            },
        );
    }

    /// Drop every entry for `path` or anything below it
    pub async fn invalidate_under(&self, path: &Path) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.path.starts_with(path));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
