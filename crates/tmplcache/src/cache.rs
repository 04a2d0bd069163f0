//! Read-through template cache with an optional background watcher.

use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::ignore::IgnoreSet;
use crate::loader;
use crate::processor::EventProcessor;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{TemplateBytes, TemplateStore};
use crate::watch_tree::{NotifyBackend, WatchTree};

/// Handle to the running watch pipeline.
struct WatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    /// Cancels the task if the cache is dropped without `stop_watcher`.
    _guard: DropGuard,
}

/// Template byte cache rooted at a directory.
///
/// Lookups are served from memory and fall through to disk on a miss. With
/// watching enabled, a background task applies filesystem changes to the
/// cache so edits show up without re-reading on every lookup.
pub struct TemplateCache {
    root: PathBuf,
    ignore: IgnoreSet,
    store: Arc<TemplateStore>,
    stats: Arc<CacheStats>,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl TemplateCache {
    /// Create an empty cache without touching the disk.
    ///
    /// An existing root is canonicalized so that watcher paths and cache keys
    /// share the same prefix.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        let root = if config.root.is_dir() {
            dunce::canonicalize(&config.root)?
        } else {
            config.root.clone()
        };

        Ok(Self {
            root,
            ignore: config.ignore_set(),
            store: Arc::new(TemplateStore::new()),
            stats: Arc::new(CacheStats::new()),
            watcher: Mutex::new(None),
        })
    }

    /// Create the cache, load every template, and start watching if enabled.
    ///
    /// A missing root is not an error: the cache starts empty and unwatched,
    /// and lookups keep reading through to disk.
    pub fn init(config: CacheConfig) -> CacheResult<Self> {
        let cache = Self::new(&config)?;

        if !cache.root_exists() {
            tracing::info!(
                root = %cache.root.display(),
                "template root missing, starting with an empty cache"
            );
            return Ok(cache);
        }

        cache.reload()?;
        if config.watch {
            cache.start_watcher()?;
        }
        Ok(cache)
    }

    /// Clear the store and bulk-load the root again.
    ///
    /// On error the store keeps whatever was loaded before the failure.
    pub fn reload(&self) -> CacheResult<usize> {
        self.store.clear();
        if !self.root_exists() {
            return Ok(0);
        }

        let loaded = loader::load_all(&self.root, &self.ignore, &self.store)?;
        tracing::info!(root = %self.root.display(), loaded, "templates loaded");
        Ok(loaded)
    }

    /// Get a template's bytes by root-relative name.
    ///
    /// `name` is normalized first, so `./a.txt` and `sub//b.txt` share the
    /// entries of `a.txt` and `sub/b.txt`. On a miss the file is read while
    /// the store lock is held, so concurrent misses on the same name read the
    /// disk once. Failed reads are returned and never cached.
    pub fn get_template(&self, name: &str) -> CacheResult<TemplateBytes> {
        let key = normalize_name(name)?;

        let mut entries = self.store.lock();
        if let Some(content) = entries.get(&key) {
            self.stats.record_hit();
            return Ok(content.clone());
        }

        self.stats.record_disk_read();
        let content: TemplateBytes = std::fs::read(self.root.join(&key))
            .map_err(|e| CacheError::from_read(&key, e))?
            .into();
        entries.insert(key, content.clone());
        Ok(content)
    }

    /// Start the background watch pipeline.
    ///
    /// Must be called from within a tokio runtime. Does nothing when the
    /// root does not exist.
    pub fn start_watcher(&self) -> CacheResult<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Err(CacheError::WatcherAlreadyRunning);
        }
        if !self.root_exists() {
            tracing::info!(root = %self.root.display(), "template root missing, not watching");
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let mut tree = WatchTree::new(NotifyBackend::new(event_tx, error_tx)?);
        let dirs = tree.register_tree(&self.root)?;

        let processor = EventProcessor::new(
            self.root.clone(),
            self.ignore.clone(),
            Arc::clone(&self.store),
            tree,
            Arc::clone(&self.stats),
        );

        let cancel = CancellationToken::new();
        let task = runtime.spawn(processor.run(event_rx, error_rx, cancel.clone()));

        *slot = Some(WatcherHandle {
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        });

        tracing::info!(root = %self.root.display(), dirs, "template watcher started");
        Ok(())
    }

    /// Stop the watch pipeline and wait for it to exit.
    ///
    /// Returns `false` if no watcher was running.
    pub async fn stop_watcher(&self) -> bool {
        let handle = self.watcher.lock().take();
        let Some(handle) = handle else {
            return false;
        };

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            tracing::warn!(error = %e, "template watcher task failed");
        }
        tracing::info!(root = %self.root.display(), "template watcher stopped");
        true
    }

    /// Whether the background watch task is running.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// The underlying store, for inspection.
    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn root_exists(&self) -> bool {
        self.root.is_dir()
    }
}

/// Turn a lookup name into the store key the loader and processor use.
///
/// Names that are empty, absolute, or climb out of the root are rejected.
/// `.` segments and repeated separators are dropped.
fn normalize_name(name: &str) -> CacheResult<String> {
    let path = Path::new(name);
    if path.is_absolute() {
        return Err(CacheError::invalid_name(name));
    }

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return Err(CacheError::invalid_name(name)),
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CacheError::invalid_name(name));
            }
        }
    }

    if parts.is_empty() {
        return Err(CacheError::invalid_name(name));
    }
    Ok(parts.join(MAIN_SEPARATOR_STR))
}
