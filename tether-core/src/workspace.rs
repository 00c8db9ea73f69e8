// ABOUTME: Read-only view of the agent's workspace built from filesystem events.
// ABOUTME: Latest directory listing, last opened file, and a bounded file-change log.

use crate::envelope::FileChangeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Oldest change entries are dropped past this many
pub const MAX_CHANGES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_dir: bool,
}

impl FileEntry {
    /// Display name, falling back to the last path segment
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: FileChangeKind,
    pub path: String,
    pub at: DateTime<Utc>,
}

/// Filesystem events extracted from the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Changed { kind: FileChangeKind, path: String },
    Listing(FileListing),
    Content(OpenFile),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceView {
    pub listing: Option<FileListing>,
    pub open_file: Option<OpenFile>,
    pub changes: VecDeque<FileChange>,
}

impl WorkspaceView {
    pub fn apply(&mut self, event: FileEvent) {
        match event {
            FileEvent::Changed { kind, path } => {
                if kind == FileChangeKind::Deleted
                    && self.open_file.as_ref().is_some_and(|f| f.path == path)
                {
                    self.open_file = None;
                }
                if self.changes.len() == MAX_CHANGES {
                    self.changes.pop_front();
                }
                self.changes.push_back(FileChange {
                    kind,
                    path,
                    at: Utc::now(),
                });
            }
            FileEvent::Listing(listing) => self.listing = Some(listing),
            FileEvent::Content(file) => self.open_file = Some(file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleting_open_file_closes_it() {
        let mut view = WorkspaceView::default();
        view.apply(FileEvent::Content(OpenFile {
            path: "/workspace/a.rs".to_string(),
            content: "fn main() {}".to_string(),
        }));
        view.apply(FileEvent::Changed {
            kind: FileChangeKind::Deleted,
            path: "/workspace/a.rs".to_string(),
        });
        assert!(view.open_file.is_none());
        assert_eq!(view.changes.len(), 1);
    }

    #[test]
    fn test_change_log_is_bounded() {
        let mut view = WorkspaceView::default();
        for i in 0..MAX_CHANGES + 5 {
            view.apply(FileEvent::Changed {
                kind: FileChangeKind::Created,
                path: format!("/workspace/{}.txt", i),
            });
        }
        assert_eq!(view.changes.len(), MAX_CHANGES);
        assert_eq!(view.changes.front().unwrap().path, "/workspace/5.txt");
    }

    #[test]
    fn test_display_name_falls_back_to_path() {
        let entry = FileEntry {
            path: "/workspace/src/".to_string(),
            name: String::new(),
            is_dir: true,
        };
        assert_eq!(entry.display_name(), "src");
    }
}
