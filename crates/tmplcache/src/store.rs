//! In-memory template byte store.
//!
//! A single mutex guards the whole map. Every read and write from lookups, the
//! bulk loader and the event processor goes through it.

use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Immutable snapshot of a template file's bytes.
pub type TemplateBytes = Arc<[u8]>;

pub(crate) type StoreGuard<'a> = MutexGuard<'a, HashMap<String, TemplateBytes>>;

/// Map from root-relative path to file bytes.
#[derive(Debug, Default)]
pub struct TemplateStore {
    entries: Mutex<HashMap<String, TemplateBytes>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bytes cached under `key`.
    pub fn get(&self, key: &str) -> Option<TemplateBytes> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: impl Into<String>, bytes: impl Into<TemplateBytes>) {
        self.entries.lock().insert(key.into(), bytes.into());
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every key below the directory `dir_key`.
    ///
    /// `dir_key` itself is never a file key, so only descendants are matched.
    pub fn remove_prefix(&self, dir_key: &str) -> usize {
        let prefix = format!("{}{}", dir_key, MAIN_SEPARATOR);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        before - entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sorted snapshot of the current keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Hold the store lock across a compound operation (read-through miss).
    pub(crate) fn lock(&self) -> StoreGuard<'_> {
        self.entries.lock()
    }
}
