//! Normalized filesystem change events.
//!
//! Raw `notify` events carry backend-specific detail (rename halves, metadata
//! vs data modification, multi-path events). The processor only needs to know
//! which path changed and in which direction, so each raw event is flattened
//! into one [`TemplateEvent`] per path.

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// Kind of change observed on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Path was created.
    Create,
    /// File contents or metadata changed.
    Modify,
    /// Path was deleted.
    Delete,
    /// Path was renamed away (this is the old name).
    RenameFrom,
    /// Path was renamed into place (this is the new name).
    RenameTo,
    /// Path took part in a rename, direction unknown.
    Rename,
}

impl ChangeKind {
    /// Whether this change removes the path when the path no longer exists.
    pub fn is_removal(self) -> bool {
        matches!(self, Self::Delete | Self::RenameFrom | Self::Rename)
    }
}

/// A single path-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl TemplateEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Flatten a raw `notify` event.
    ///
    /// Access and unclassified events yield nothing.
    pub fn from_notify(event: Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Remove(_) => ChangeKind::Delete,
            EventKind::Modify(ModifyKind::Name(mode)) => {
                return Self::from_rename(mode, event.paths);
            }
            EventKind::Modify(_) => ChangeKind::Modify,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .map(|path| Self::new(kind, path))
            .collect()
    }

    fn from_rename(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<Self> {
        match mode {
            RenameMode::From => paths
                .into_iter()
                .map(|p| Self::new(ChangeKind::RenameFrom, p))
                .collect(),
            RenameMode::To => paths
                .into_iter()
                .map(|p| Self::new(ChangeKind::RenameTo, p))
                .collect(),
            // Both: paths[0] is the old name, paths[1] the new one.
            RenameMode::Both if paths.len() == 2 => {
                let mut paths = paths.into_iter();
                let from = paths.next().map(|p| Self::new(ChangeKind::RenameFrom, p));
                let to = paths.next().map(|p| Self::new(ChangeKind::RenameTo, p));
                from.into_iter().chain(to).collect()
            }
            _ => paths
                .into_iter()
                .map(|p| Self::new(ChangeKind::Rename, p))
                .collect(),
        }
    }
}
