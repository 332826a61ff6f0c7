//! Detecting when an asynchronous download has finished.
//!
//! A browser writes into a temporary name and renames at the end, and some
//! pre-create the final name as an empty file. A new file therefore only
//! counts once it carries no in-progress marker, has no in-progress sibling,
//! and reports the same size on two consecutive polls.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Suffixes browsers use for files still being written.
pub const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".partial", ".download", ".tmp"];

/// One observation of a file in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub observed_at: SystemTime,
}

/// Lists the regular files in a directory.
pub trait DirectoryWatcher: Send + Sync {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileSnapshot>>;
}

/// [`DirectoryWatcher`] over the real filesystem. A missing directory is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWatcher;

impl DirectoryWatcher for FsWatcher {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileSnapshot>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            // The file may vanish between listing and stat (renamed by the browser).
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_file() {
                files.push(FileSnapshot {
                    path: entry.path(),
                    size_bytes: meta.len(),
                    observed_at: now,
                });
            }
        }
        Ok(files)
    }
}

/// Whether a file name marks an in-progress download.
pub fn is_partial_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with(".~") || PARTIAL_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

/// Paths present in `dir` right now, taken before a download is triggered.
pub fn snapshot_paths(watcher: &dyn DirectoryWatcher, dir: &Path) -> io::Result<HashSet<PathBuf>> {
    Ok(watcher
        .list_files(dir)?
        .into_iter()
        .map(|f| f.path)
        .collect())
}

/// Polls one directory for a new, stable file.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Only accept files with this extension (case-insensitive, no dot).
    pub require_extension: Option<String>,
    /// Leave zero-byte files alone and keep waiting instead of failing.
    pub ignore_empty: bool,
}

impl CompletionDetector {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
            require_extension: None,
            ignore_empty: false,
        }
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.require_extension = Some(ext.trim_start_matches('.').to_lowercase());
        self
    }

    /// For folders the user owns: an empty file is not ours to delete.
    pub fn ignoring_empty(mut self) -> Self {
        self.ignore_empty = true;
        self
    }

    fn extension_ok(&self, path: &Path) -> bool {
        match &self.require_extension {
            None => true,
            Some(want) => path
                .extension()
                .is_some_and(|e| e.to_string_lossy().to_lowercase() == *want),
        }
    }

    /// Wait for a file in `dir` that was not in `before` to finish.
    ///
    /// Returns the file's path, [`FetchError::EmptyDownload`] for a finished
    /// zero-byte file (which is deleted, unless [`Self::ignore_empty`] is set, in
    /// which case it is skipped), [`FetchError::DownloadTimeout`] when
    /// `timeout` elapses, or [`FetchError::UserSkipped`] when `cancel` fires.
    pub async fn wait_for_file(
        &self,
        watcher: &dyn DirectoryWatcher,
        dir: &Path,
        before: &HashSet<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut last_sizes: HashMap<PathBuf, u64> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::UserSkipped);
            }

            let files = watcher.list_files(dir)?;
            let names: HashSet<String> = files
                .iter()
                .filter_map(|f| f.path.file_name().map(|n| n.to_string_lossy().to_lowercase()))
                .collect();

            let mut current: HashMap<PathBuf, u64> = HashMap::new();
            for file in files {
                if before.contains(&file.path) {
                    continue;
                }
                let Some(name) = file.path.file_name().map(|n| n.to_string_lossy().to_string())
                else {
                    continue;
                };
                if is_partial_name(&name) || !self.extension_ok(&file.path) {
                    continue;
                }
                if self.ignore_empty && file.size_bytes == 0 {
                    continue;
                }
                let lower = name.to_lowercase();
                if PARTIAL_SUFFIXES
                    .iter()
                    .any(|s| names.contains(&format!("{}{}", lower, s)))
                {
                    continue;
                }
                current.insert(file.path, file.size_bytes);
            }

            // Sorted for a deterministic pick when several files settle at once.
            let mut settled: Vec<(&PathBuf, &u64)> = current
                .iter()
                .filter(|(path, size)| last_sizes.get(*path) == Some(*size))
                .collect();
            settled.sort();

            if let Some((path, size)) = settled.first() {
                if **size == 0 {
                    tracing::warn!(path = %path.display(), "download finished empty, deleting");
                    std::fs::remove_file(path)?;
                    return Err(FetchError::EmptyDownload);
                }
                tracing::debug!(path = %path.display(), size = **size, "download complete");
                return Ok((*path).clone());
            }

            tracing::debug!(candidates = current.len(), "waiting for download");
            last_sizes = current;

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(FetchError::DownloadTimeout);
            }
            let sleep_for = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::UserSkipped),
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}
