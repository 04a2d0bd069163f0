//! Cache error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Template cache error type.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Template not found on disk.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Template name is absolute or escapes the root.
    #[error("invalid template name: {0}")]
    InvalidName(String),

    /// Directory walk failed during bulk load or watch registration.
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// The OS watcher could not be created or could not watch a path.
    #[error("watch error on {path}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    /// `start_watcher` was called while a watcher is already running.
    #[error("watcher already running")]
    WatcherAlreadyRunning,

    /// Watching requires a tokio runtime on the calling thread.
    #[error("no tokio runtime available to run the watcher")]
    NoRuntime,

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CacheError {
    /// Create a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    /// Create a Watch error.
    pub fn watch(path: impl Into<PathBuf>, source: notify::Error) -> Self {
        Self::Watch {
            path: path.into(),
            source,
        }
    }

    /// Map an I/O error from reading `name`, keeping not-found distinct.
    pub(crate) fn from_read(name: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(name.to_string())
        } else {
            Self::Io(err)
        }
    }

    /// Whether this error means the template does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<walkdir::Error> for CacheError {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
        Self::Walk { path, source: e }
    }
}

/// Cache result type.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_read_maps_not_found() {
        let err = CacheError::from_read("a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, CacheError::NotFound(ref n) if n == "a.txt"));
        assert!(err.is_not_found());

        let err = CacheError::from_read("a.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, CacheError::Io(_)));
        assert!(!err.is_not_found());
    }
}
