/// Reverting the most recent sorting batch.
///
/// Files recorded in the history log are moved back to where they were found,
/// newest move first.
use crate::history::{HistoryError, Operation, OperationLog};
use crate::placement::{PlacementError, move_file};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that prevent an undo from starting.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("invalid source directory {}: {source}", path.display())]
    InvalidSourceRoot { path: PathBuf, source: io::Error },
    #[error("no previous sorting run found to undo")]
    NothingToUndo,
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Why a single file could not be restored.
#[derive(Debug)]
enum RestoreFailure {
    /// The sorted file is gone; nothing to move back.
    Missing(PathBuf),
    /// The move back (or backing up a conflict) failed.
    Failed(PathBuf, String),
}

/// Result of an undo run.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Number of files successfully restored.
    pub restored_files: usize,
    /// Files that could not be moved back, with the reason.
    pub failed_restores: Vec<(PathBuf, String)>,
    /// Files that were no longer at their sorted location.
    pub skipped_files: Vec<(PathBuf, String)>,
}

impl UndoReport {
    pub fn total_processed(&self) -> usize {
        self.restored_files + self.failed_restores.len() + self.skipped_files.len()
    }

    /// Returns true if the undo was completely successful.
    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

/// Manages undo operations.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the last batch recorded under `<source_root>/<destination_dir>`.
    ///
    /// # Edge Cases Handled
    ///
    /// * **File not found**: skipped, reported in `skipped_files`
    /// * **Name conflict at the original location**: the existing file is
    ///   renamed to `<name>.bak.<timestamp>` first
    /// * **Permission denied**: reported in `failed_restores`
    ///
    /// The history log is deleted only when every file was restored.
    pub fn undo(source_root: &Path, destination_dir: &str) -> Result<UndoReport, UndoError> {
        if let Err(e) = source_root.metadata() {
            return Err(UndoError::InvalidSourceRoot {
                path: source_root.to_path_buf(),
                source: e,
            });
        }

        let destination_root = source_root.join(destination_dir);
        let log = OperationLog::load(&destination_root)?.ok_or(UndoError::NothingToUndo)?;
        info!(
            operations = log.operations.len(),
            recorded_at = %log.timestamp,
            "undoing sorting run"
        );

        let mut report = UndoReport::default();
        for operation in log.operations.iter().rev() {
            match Self::restore_file(operation) {
                Ok(()) => report.restored_files += 1,
                Err(RestoreFailure::Missing(path)) => report
                    .skipped_files
                    .push((path, "file not found at sorted location".to_string())),
                Err(RestoreFailure::Failed(path, reason)) => {
                    warn!(file = %path.display(), %reason, "restore failed");
                    report.failed_restores.push((path, reason));
                }
            }
        }

        if report.is_complete_success()
            && let Err(e) = OperationLog::delete(&destination_root)
        {
            warn!(error = %e, "could not delete history file");
        }

        Ok(report)
    }

    fn restore_file(operation: &Operation) -> Result<(), RestoreFailure> {
        if !operation.new_path.exists() {
            return Err(RestoreFailure::Missing(operation.new_path.clone()));
        }

        if operation.original_path.exists() {
            let backup_path = Self::generate_backup_path(&operation.original_path);
            move_file(&operation.original_path, &backup_path).map_err(|e| {
                RestoreFailure::Failed(
                    operation.original_path.clone(),
                    format!("could not back up conflicting file: {}", source_of(&e)),
                )
            })?;
        }

        move_file(&operation.new_path, &operation.original_path).map_err(|e| {
            RestoreFailure::Failed(
                operation.new_path.clone(),
                format!("failed to restore file: {}", source_of(&e)),
            )
        })
    }

    /// `file.txt` becomes `file.txt.bak.20251109-143052`.
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        original_path.with_file_name(format!("{filename}.bak.{timestamp}"))
    }
}

fn source_of(err: &PlacementError) -> String {
    match err {
        PlacementError::MoveFailed { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}
