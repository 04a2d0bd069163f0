//! Eager bulk loader.
//!
//! Walks a directory tree once and caches every regular, non-ignored file
//! under its root-relative key. The first walk or read error aborts the rest
//! of the walk; entries stored before the failure stay in the store.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::CacheResult;
use crate::ignore::IgnoreSet;
use crate::store::TemplateStore;

/// Compute the cache key for `path` relative to `root`.
///
/// Returns `None` for paths outside the root, for the root itself, and for
/// paths that are not valid UTF-8 (lookups are by `&str`, so such files can
/// never be asked for).
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let Some(key) = rel.to_str() else {
        tracing::debug!(path = %path.display(), "skipping non UTF-8 template path");
        return None;
    };
    Some(key.to_owned())
}

/// Load every file under `root` into `store`. Returns the number cached.
pub fn load_all(root: &Path, ignore: &IgnoreSet, store: &TemplateStore) -> CacheResult<usize> {
    load_tree(root, root, ignore, store)
}

/// Load every file under `dir` into `store`, keyed relative to `root`.
///
/// `dir` must be `root` or a directory beneath it.
pub fn load_tree(
    root: &Path,
    dir: &Path,
    ignore: &IgnoreSet,
    store: &TemplateStore,
) -> CacheResult<usize> {
    let mut loaded = 0;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if ignore.is_ignored(path) {
            continue;
        }
        let Some(key) = relative_key(root, path) else {
            continue;
        };

        let content = std::fs::read(path).inspect_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to read template");
        })?;
        store.put(key, content);
        loaded += 1;
    }

    Ok(loaded)
}
