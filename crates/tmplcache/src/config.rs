//! Cache configuration.
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! root = "templates"
//! watch = true
//! ignore = [".DS_Store", "README.md"]
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CacheError, CacheResult};
use crate::ignore::IgnoreSet;

const DEFAULT_ROOT: &str = "templates";

/// Template cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the templates.
    pub root: PathBuf,
    /// Keep the cache in sync with the filesystem in the background.
    pub watch: bool,
    /// Exact basenames never cached.
    pub ignore: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            watch: false,
            ignore: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(names.into_iter().map(Into::into));
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        toml::from_str(content).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn ignore_set(&self) -> IgnoreSet {
        self.ignore.iter().cloned().collect()
    }
}
