// Service module - Read, list and delete paths of the partitioned log tree

mod cache;

pub use cache::ResultCache;

use crate::error::{LogSinkError, Result};
use crate::logs::{collect_log_files, merge_most_recent, StreamCache, WindowedReader};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Options of a read request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Keep only records with this severity name
    pub level: Option<String>,
    /// List a directory instead of reading the logs below it
    pub list: bool,
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes, 0 for directories
    pub size: u64,
    /// Path relative to the log root, `/`-separated
    pub path: String,
}

/// What a read request produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadResponse {
    Records(Vec<Value>),
    Listing(Vec<DirEntry>),
}

/// Read path over the log tree: file tails, directory aggregates, listings
/// and deletion, with a result cache in front of single-file reads.
pub struct LogService {
    root: PathBuf,
    reader: WindowedReader,
    streams: Arc<StreamCache>,
    results: ResultCache,
}

impl LogService {
    /// Create a service over the tree owned by `streams`
    pub fn new(reader: WindowedReader, streams: Arc<StreamCache>, result_cache_entries: usize) -> Self {
        Self {
            root: streams.root().to_path_buf(),
            reader,
            streams,
            results: ResultCache::new(result_cache_entries),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reader(&self) -> &WindowedReader {
        &self.reader
    }

    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    /// Map a client path onto the log root, refusing anything that could
    /// step outside it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let trimmed = relative.trim_matches('/');
        let mut resolved = self.root.clone();

        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(LogSinkError::InvalidPath(relative.to_string()));
                }
            }
        }

        Ok(resolved)
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LogSinkError::LogError(format!("Failed to create log directory: {}", e)))
    }

    /// Serve a read request for `relative`
    ///
    /// # Returns
    /// * `Ok(ReadResponse::Records)` - File tail, or merged tails of a directory
    /// * `Ok(ReadResponse::Listing)` - Directory listing when `options.list` is set
    /// * `Err(LogSinkError::NotFound)` - Nothing exists at the path
    pub async fn read(&self, relative: &str, options: &ReadOptions) -> Result<ReadResponse> {
        self.ensure_root().await?;
        let path = self.resolve(relative)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogSinkError::NotFound(relative.to_string())
            } else {
                LogSinkError::LogFileError(format!("{}: {}", path.display(), e))
            }
        })?;

        let level = options.level.as_deref();

        if metadata.is_file() {
            return Ok(ReadResponse::Records(self.read_file(&path, level).await?));
        }

        if options.list {
            return Ok(ReadResponse::Listing(self.list_dir(&path, relative).await?));
        }

        Ok(ReadResponse::Records(self.read_aggregate(&path, level).await?))
    }

    /// Tail one file, answering from the result cache while the file is unchanged
    pub async fn read_file(&self, path: &Path, level: Option<&str>) -> Result<Vec<Value>> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogSinkError::NotFound(path.display().to_string())
            } else {
                LogSinkError::LogFileError(format!("{}: {}", path.display(), e))
            }
        })?;
        let size = metadata.len();
        let modified = metadata.modified().ok();

        if let Some(records) = self.results.get(path, level, size, modified).await {
            debug!("Serving cached read of {}", path.display());
            return Ok(records);
        }

        let window = self.reader.read(path, level).await?;

        // Only a read of exactly the file state that was checked is cached
        if window.file_size == size {
            self.results
                .insert(path, level, size, modified, window.records.clone())
                .await;
        }

        Ok(window.records)
    }

    /// Tail every log file below `dir` and merge, most recent first
    pub async fn read_aggregate(&self, dir: &Path, level: Option<&str>) -> Result<Vec<Value>> {
        let files = collect_log_files(dir).await?;
        let mut windows = Vec::with_capacity(files.len());

        for file in files {
            match self.read_file(&file, level).await {
                Ok(records) => windows.push(records),
                // Deleted between the walk and the read
                Err(LogSinkError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(merge_most_recent(windows, self.reader.settings().max_records))
    }

    /// List the entries of a directory below the root
    pub async fn list(&self, relative: &str) -> Result<Vec<DirEntry>> {
        self.ensure_root().await?;
        let path = self.resolve(relative)?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(LogSinkError::NotFound(relative.to_string()));
        }

        self.list_dir(&path, relative).await
    }

    async fn list_dir(&self, dir: &Path, relative: &str) -> Result<Vec<DirEntry>> {
        let prefix = relative.trim_matches('/');
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", dir.display(), e)))?;
        let mut listing = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", dir.display(), e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| LogSinkError::DirectoryRead(format!("{}: {}", dir.display(), e)))?;

            let (kind, size) = if file_type.is_dir() {
                (EntryKind::Dir, 0)
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                (EntryKind::File, size)
            };

            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };

            listing.push(DirEntry {
                name,
                kind,
                size,
                path,
            });
        }

        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Delete a file or subtree and forget everything cached about it
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        if path == self.root {
            return Err(LogSinkError::InvalidPath(
                "refusing to delete the log root, use clear".to_string(),
            ));
        }

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogSinkError::NotFound(relative.to_string())
            } else {
                LogSinkError::LogFileError(format!("{}: {}", path.display(), e))
            }
        })?;

        self.streams.evict_under(&path).await;

        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }

        // A write racing the removal may have reopened a handle
        self.streams.evict_under(&path).await;

        let invalidated = self.results.invalidate_under(&path).await;
        info!("Deleted {} ({} cached results dropped)", path.display(), invalidated);

        Ok(())
    }

    /// Delete every log and reset both caches
    pub async fn clear(&self) -> Result<()> {
        self.streams.clear().await;

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.streams.clear().await;
        self.ensure_root().await?;
        self.results.clear().await;
        info!("Cleared all logs under {}", self.root.display());

        Ok(())
    }
}
