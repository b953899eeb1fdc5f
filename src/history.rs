/// Persistent record of the files moved by the last sorting batch.
///
/// The log is stored as pretty-printed JSON inside the destination root so
/// that it is never picked up as an input file on the next run.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the history log inside the destination root.
pub const HISTORY_FILE: &str = ".docflow_history.json";

/// Errors reading or writing the history log.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to write history file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to read history file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("invalid history file format: {0}")]
    InvalidFormat(String),
}

/// A single recorded move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Where the file was before sorting.
    pub original_path: PathBuf,
    /// Where the file was moved to.
    pub new_path: PathBuf,
    /// Category path chosen for the file.
    pub category: String,
}

/// All moves performed in one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    /// RFC 3339 timestamp of the batch.
    pub timestamp: String,
    /// The directory that was sorted.
    pub source_root: PathBuf,
    pub operations: Vec<Operation>,
}

impl OperationLog {
    pub fn new(source_root: PathBuf) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            source_root,
            operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Path of the log for a given destination root.
    pub fn history_file_path(destination_root: &Path) -> PathBuf {
        destination_root.join(HISTORY_FILE)
    }

    /// Writes the log, replacing any previous one.
    pub fn save(&self, destination_root: &Path) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            HistoryError::WriteFailed(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        fs::create_dir_all(destination_root).map_err(HistoryError::WriteFailed)?;
        fs::write(Self::history_file_path(destination_root), json)
            .map_err(HistoryError::WriteFailed)
    }

    /// Loads the log, or `None` when no batch has been recorded.
    pub fn load(destination_root: &Path) -> Result<Option<Self>, HistoryError> {
        let path = Self::history_file_path(destination_root);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).map_err(HistoryError::ReadFailed)?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| HistoryError::InvalidFormat(e.to_string()))
    }

    /// Removes the log if present.
    pub fn delete(destination_root: &Path) -> Result<(), HistoryError> {
        let path = Self::history_file_path(destination_root);
        if path.exists() {
            fs::remove_file(&path).map_err(HistoryError::WriteFailed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("Sorted_AI");

        let mut log = OperationLog::new(temp.path().to_path_buf());
        log.add_operation(Operation {
            original_path: temp.path().join("setup.exe"),
            new_path: dest.join("Apps/setup.exe"),
            category: "Apps".to_string(),
        });
        log.save(&dest).unwrap();

        let loaded = OperationLog::load(&dest).unwrap().unwrap();
        assert_eq!(loaded, log);
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(OperationLog::load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HISTORY_FILE), "{ not json").unwrap();
        assert!(matches!(
            OperationLog::load(temp.path()),
            Err(HistoryError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        OperationLog::new(temp.path().to_path_buf())
            .save(temp.path())
            .unwrap();
        OperationLog::delete(temp.path()).unwrap();
        OperationLog::delete(temp.path()).unwrap();
        assert!(!OperationLog::history_file_path(temp.path()).exists());
    }
}
