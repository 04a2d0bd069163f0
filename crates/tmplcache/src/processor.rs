//! Event processor: filesystem notifications → cache and watch mutations.
//!
//! # State machine
//!
//! ```text
//!   event ──► key (root-relative) ──► ignored basename? ──yes──► discard
//!                                          │ no
//!                                          ▼
//!                                   stat(path)
//!                     ┌────────────────────┼───────────────────────┐
//!                  is dir               is file                 failed
//!                     │                    │                       │
//!   create/renameTo ► watch subtree   read + put          removal kinds: decide
//!   modify          ► no-op           read + put          dir/file from the
//!   delete/rename   ► unwatch subtree delete key          watch set, then remove;
//!                                                         otherwise drop
//! ```
//!
//! Failures never leave the task. They are counted in [`CacheStats`] and
//! logged, and the cache stays stale until a later event or lookup repairs it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::Event;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{ChangeKind, TemplateEvent};
use crate::ignore::IgnoreSet;
use crate::loader::{load_tree, relative_key};
use crate::stats::CacheStats;
use crate::store::TemplateStore;
use crate::watch_tree::{WatchBackend, WatchTree};

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// File bytes were (re)cached.
    Cached,
    /// A file key was removed.
    Evicted,
    /// A directory subtree was registered for watching.
    Watched,
    /// A directory subtree was unregistered and its keys purged.
    Unwatched,
    /// Directory modification; nothing to do.
    Unchanged,
    /// Path is the root, outside it, or has an ignored basename.
    Ignored,
    /// Stat or read failed; event skipped. For a new directory, its watch
    /// may be in place while some of its files were left uncached.
    Dropped,
}

/// Consumes change notifications and keeps the store and watch tree current.
pub struct EventProcessor<B: WatchBackend> {
    root: PathBuf,
    ignore: IgnoreSet,
    store: Arc<TemplateStore>,
    tree: WatchTree<B>,
    stats: Arc<CacheStats>,
}

impl<B: WatchBackend> EventProcessor<B> {
    pub fn new(
        root: PathBuf,
        ignore: IgnoreSet,
        store: Arc<TemplateStore>,
        tree: WatchTree<B>,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            root,
            ignore,
            store,
            tree,
            stats,
        }
    }

    pub fn tree(&self) -> &WatchTree<B> {
        &self.tree
    }

    /// Process notifications until `cancel` fires.
    ///
    /// Watcher errors are logged and counted; they never end the loop.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut errors: mpsc::UnboundedReceiver<notify::Error>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(root = %self.root.display(), "event processor cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event source closed");
                        break;
                    };
                    for event in TemplateEvent::from_notify(event) {
                        self.handle(event).await;
                    }
                }
                Some(error) = errors.recv() => {
                    self.stats.record_watch_error();
                    tracing::warn!(
                        error = %error,
                        paths = ?error.paths,
                        "template watcher reported an error"
                    );
                }
            }
        }
    }

    /// Apply a single event.
    pub async fn handle(&mut self, event: TemplateEvent) -> EventOutcome {
        let outcome = self.apply(&event).await;
        match outcome {
            EventOutcome::Ignored => self.stats.record_ignored(),
            EventOutcome::Dropped => self.stats.record_dropped(),
            EventOutcome::Unchanged => {}
            _ => self.stats.record_applied(),
        }
        outcome
    }

    async fn apply(&mut self, event: &TemplateEvent) -> EventOutcome {
        let path = event.path.as_path();
        let Some(key) = relative_key(&self.root, path) else {
            return EventOutcome::Ignored;
        };
        if self.ignore.is_ignored(path) {
            return EventOutcome::Ignored;
        }

        let is_dir = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_dir(),
            // Removed paths can't be stat'ed; the watch set remembers which
            // of them were directories.
            Err(_) if event.kind.is_removal() => {
                return if self.tree.is_watched(path) {
                    self.remove_dir(path, &key)
                } else {
                    self.remove_file(&key)
                };
            }
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    kind = ?event.kind,
                    error = %e,
                    "stat failed, event dropped"
                );
                return EventOutcome::Dropped;
            }
        };

        match (event.kind, is_dir) {
            // The path exists, so an undirected rename is its arrival.
            (ChangeKind::Create | ChangeKind::RenameTo | ChangeKind::Rename, true) => {
                self.add_dir(path).await
            }
            (ChangeKind::Create | ChangeKind::RenameTo | ChangeKind::Rename, false) => {
                self.read_file(path, key).await
            }
            (ChangeKind::Modify, true) => EventOutcome::Unchanged,
            (ChangeKind::Modify, false) => self.read_file(path, key).await,
            (ChangeKind::Delete | ChangeKind::RenameFrom, true) => self.remove_dir(path, &key),
            (ChangeKind::Delete | ChangeKind::RenameFrom, false) => self.remove_file(&key),
        }
    }

    async fn read_file(&self, path: &Path, key: String) -> EventOutcome {
        match tokio::fs::read(path).await {
            Ok(content) => {
                tracing::debug!(key = %key, bytes = content.len(), "template cached");
                self.store.put(key, content);
                EventOutcome::Cached
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "template read failed, event dropped");
                EventOutcome::Dropped
            }
        }
    }

    fn remove_file(&self, key: &str) -> EventOutcome {
        if self.store.delete(key) {
            tracing::debug!(key = %key, "template evicted");
        }
        EventOutcome::Evicted
    }

    /// Watch a new directory subtree and cache files that landed in it
    /// before its watch existed.
    ///
    /// Registration walks directories only and stays on the task; the file
    /// reads run on the blocking pool. A failed load leaves the watch in
    /// place and drops the event, so lookups read the missing files through.
    async fn add_dir(&mut self, dir: &Path) -> EventOutcome {
        match self.tree.register_tree(dir) {
            Ok(added) => {
                tracing::debug!(dir = %dir.display(), added, "directory watched");
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to watch new directory");
                return EventOutcome::Dropped;
            }
        }

        let root = self.root.clone();
        let subtree = dir.to_path_buf();
        let ignore = self.ignore.clone();
        let store = Arc::clone(&self.store);
        let loaded =
            tokio::task::spawn_blocking(move || load_tree(&root, &subtree, &ignore, &store)).await;

        match loaded {
            Ok(Ok(loaded)) => {
                tracing::debug!(dir = %dir.display(), loaded, "new directory loaded");
                EventOutcome::Watched
            }
            Ok(Err(e)) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to load new directory, event dropped");
                EventOutcome::Dropped
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "directory load task failed, event dropped");
                EventOutcome::Dropped
            }
        }
    }

    fn remove_dir(&mut self, dir: &Path, key: &str) -> EventOutcome {
        let unwatched = self.tree.unregister_tree(dir);
        let purged = self.store.remove_prefix(key);
        tracing::debug!(dir = %dir.display(), unwatched, purged, "directory unwatched");
        EventOutcome::Unwatched
    }
}
