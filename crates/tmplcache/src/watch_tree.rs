//! Per-directory watch registration.
//!
//! Directories are watched non-recursively: a directory watch reports
//! membership and content changes of its direct children, so every directory
//! under the root needs its own watch. [`WatchTree`] keeps that set in step
//! with the tree as directories appear and disappear.
//!
//! The OS integration sits behind [`WatchBackend`] so the tree and the event
//! processor can be driven deterministically in tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::error::{CacheError, CacheResult};

/// Something that can add and remove directory watches.
pub trait WatchBackend: Send + 'static {
    /// Start watching the direct children of `dir`.
    fn watch(&mut self, dir: &Path) -> CacheResult<()>;

    /// Stop watching `dir`.
    fn unwatch(&mut self, dir: &Path) -> CacheResult<()>;
}

/// `notify`-backed watch backend.
///
/// Events and watcher errors are forwarded into two unbounded channels.
/// Unbounded so the OS watcher thread never blocks on a slow consumer while
/// the consumer is itself waiting on that thread to add a watch.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    pub fn new(
        events: mpsc::UnboundedSender<Event>,
        errors: mpsc::UnboundedSender<notify::Error>,
    ) -> CacheResult<Self> {
        let watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = events.send(event);
                }
                Err(e) => {
                    let _ = errors.send(e);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| CacheError::watch(PathBuf::new(), e))?;

        Ok(Self { watcher })
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, dir: &Path) -> CacheResult<()> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| CacheError::watch(dir, e))
    }

    fn unwatch(&mut self, dir: &Path) -> CacheResult<()> {
        self.watcher.unwatch(dir).map_err(|e| CacheError::watch(dir, e))
    }
}

/// Set of directories with an active watch.
pub struct WatchTree<B: WatchBackend> {
    backend: B,
    watched: HashSet<PathBuf>,
}

impl<B: WatchBackend> WatchTree<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            watched: HashSet::new(),
        }
    }

    /// Watch a single directory. Already-watched directories are left alone.
    pub fn register(&mut self, dir: &Path) -> CacheResult<bool> {
        if self.watched.contains(dir) {
            return Ok(false);
        }
        self.backend.watch(dir)?;
        self.watched.insert(dir.to_path_buf());
        tracing::trace!(dir = %dir.display(), "watch registered");
        Ok(true)
    }

    /// Watch `dir` and every directory beneath it.
    ///
    /// Returns the number of newly registered directories. The first failure
    /// stops the walk; directories registered before it stay registered.
    pub fn register_tree(&mut self, dir: &Path) -> CacheResult<usize> {
        let mut added = 0;
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_dir() && self.register(entry.path())? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Drop the watch on `dir` and on every watched directory beneath it.
    ///
    /// The OS usually discards watches on deleted directories by itself, so
    /// backend failures here are logged and otherwise ignored.
    pub fn unregister_tree(&mut self, dir: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();

        for path in &doomed {
            if let Err(e) = self.backend.unwatch(path) {
                tracing::debug!(dir = %path.display(), error = %e, "unwatch failed");
            }
            self.watched.remove(path);
        }
        doomed.len()
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// Sorted snapshot of watched directories.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.watched.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// In-memory backend that records calls. Test support.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub watch_calls: Vec<PathBuf>,
    pub unwatch_calls: Vec<PathBuf>,
    pub fail_on: Option<PathBuf>,
}

#[cfg(test)]
impl WatchBackend for RecordingBackend {
    fn watch(&mut self, dir: &Path) -> CacheResult<()> {
        if self.fail_on.as_deref() == Some(dir) {
            return Err(CacheError::watch(
                dir,
                notify::Error::generic("injected watch failure"),
            ));
        }
        self.watch_calls.push(dir.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, dir: &Path) -> CacheResult<()> {
        self.unwatch_calls.push(dir.to_path_buf());
        Ok(())
    }
}
