//! Immutable snapshot of a file taken at enumeration time.

use std::fs::{self, DirEntry};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A regular file found directly inside the source directory.
///
/// The orchestrator never re-stats a file mid-pipeline; every decision is made
/// from this snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// The full path to the file.
    pub path: PathBuf,
    /// The file name, including extension.
    pub name: String,
    /// Lowercased extension without the dot, empty when there is none.
    pub extension: String,
    /// Last modification time, `None` if the platform could not report it.
    pub modified: Option<SystemTime>,
}

impl FileTask {
    /// Builds a task from a path and an optional modification time.
    pub fn new(path: PathBuf, modified: Option<SystemTime>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            path,
            name,
            extension,
            modified,
        }
    }

    /// Snapshots a directory entry, reading its metadata once.
    pub fn from_entry(entry: &DirEntry) -> Self {
        let modified = entry.metadata().and_then(|m| m.modified()).ok();
        Self::new(entry.path(), modified)
    }

    /// Snapshots an arbitrary path.
    pub fn from_path(path: &Path) -> Self {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        Self::new(path.to_path_buf(), modified)
    }

    /// File name without its final extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }

    /// The original extension exactly as written, including the leading dot,
    /// or an empty string.
    pub fn original_suffix(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }
}
