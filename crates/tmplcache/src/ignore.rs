//! Basename ignore set.
//!
//! Entries are exact file names, not patterns. A path is ignored when its
//! final component matches one of them; ignored files are never cached by the
//! loader or the event processor, but stay readable through lookups.

use std::collections::HashSet;
use std::path::Path;

/// Set of exact basenames excluded from caching and event handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    names: HashSet<String>,
}

impl IgnoreSet {
    /// Create an empty ignore set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a basename.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Whether `name` is an ignored basename.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether the final component of `path` is ignored.
    pub fn is_ignored(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.names.contains(name.to_string_lossy().as_ref()),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
