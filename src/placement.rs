/// Destination paths and the move operation.
///
/// This module turns a category and a candidate name into a concrete,
/// collision-free path under the destination root, creates the category
/// directory, and moves the file there.
use crate::category::Category;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default ceiling on `_N` suffix probes for a single file.
pub const DEFAULT_MAX_PROBES: u32 = 10_000;

/// Errors that can occur while placing a file.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// Failed to create a category directory.
    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to move a file to its destination.
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Every suffix up to the probe ceiling is taken.
    #[error("no free name for '{name}' in {} after {attempts} attempts", dir.display())]
    CollisionLimit {
        dir: PathBuf,
        name: String,
        attempts: u32,
    },
}

/// Result type for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// A resolved, currently-free destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub category: Category,
    pub path: PathBuf,
}

impl Destination {
    /// Final file name at the destination.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Replaces every character outside `[alphanumeric _ - .]` with `_`.
///
/// # Examples
///
/// ```
/// use docflow::placement::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Invoice #123 (March)"), "Invoice__123__March_");
/// assert_eq!(sanitize_file_name("a/b\\c"), "a_b_c");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strips the last extension from a classifier-proposed name.
///
/// A leading dot does not count as an extension separator.
pub fn proposed_stem(name: &str) -> &str {
    let name = name.trim();
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Computes destinations under a fixed root.
#[derive(Debug, Clone)]
pub struct PlacementResolver {
    root: PathBuf,
    max_probes: u32,
}

impl PlacementResolver {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            max_probes: DEFAULT_MAX_PROBES,
        }
    }

    pub fn with_max_probes(mut self, max_probes: u32) -> Self {
        self.max_probes = max_probes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds the sanitized file name: `<sanitized stem><original suffix>`.
    ///
    /// `original_suffix` is appended verbatim (including its dot). When the
    /// proposal sanitizes to nothing useful, `fallback_stem` is used instead.
    pub fn file_name_for(raw_name: &str, fallback_stem: &str, original_suffix: &str) -> String {
        let mut stem = sanitize_file_name(proposed_stem(raw_name));
        if stem.trim_matches(|c| c == '_' || c == '.').is_empty() {
            stem = sanitize_file_name(fallback_stem);
        }
        if stem.is_empty() {
            stem = "file".to_string();
        }
        format!("{stem}{original_suffix}")
    }

    /// Resolves the destination and creates the category directory.
    ///
    /// The returned path did not exist when it was probed.
    pub fn resolve(
        &self,
        category: &Category,
        raw_name: &str,
        fallback_stem: &str,
        original_suffix: &str,
    ) -> PlacementResult<Destination> {
        let dir = category.dir_under(&self.root);
        fs::create_dir_all(&dir).map_err(|e| PlacementError::DirectoryCreationFailed {
            path: dir.clone(),
            source: e,
        })?;

        let file_name = Self::file_name_for(raw_name, fallback_stem, original_suffix);
        let path = self.unique_path(&dir, &file_name, |p| p.exists())?;
        debug!(category = %category, destination = %path.display(), "resolved destination");

        Ok(Destination {
            category: category.clone(),
            path,
        })
    }

    /// Resolves a destination without touching the filesystem beyond
    /// existence checks; `reserved` holds paths already planned in this batch.
    pub fn plan(
        &self,
        category: &Category,
        raw_name: &str,
        fallback_stem: &str,
        original_suffix: &str,
        reserved: &HashSet<PathBuf>,
    ) -> PlacementResult<Destination> {
        let dir = category.dir_under(&self.root);
        let file_name = Self::file_name_for(raw_name, fallback_stem, original_suffix);
        let path = self.unique_path(&dir, &file_name, |p| p.exists() || reserved.contains(p))?;

        Ok(Destination {
            category: category.clone(),
            path,
        })
    }

    /// Linear probe: `name.ext`, `name_1.ext`, `name_2.ext`, ...
    fn unique_path(
        &self,
        dir: &Path,
        file_name: &str,
        taken: impl Fn(&Path) -> bool,
    ) -> PlacementResult<PathBuf> {
        let candidate = dir.join(file_name);
        if !taken(&candidate) {
            return Ok(candidate);
        }

        let candidate_path = Path::new(file_name);
        let stem = candidate_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        let suffix = candidate_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        for counter in 1..=self.max_probes {
            let candidate = dir.join(format!("{stem}_{counter}{suffix}"));
            if !taken(&candidate) {
                return Ok(candidate);
            }
        }

        Err(PlacementError::CollisionLimit {
            dir: dir.to_path_buf(),
            name: file_name.to_string(),
            attempts: self.max_probes,
        })
    }
}

/// Moves a file, falling back to copy + delete across filesystems.
///
/// On a failed fallback the partial copy is removed so the content never
/// lives in two places.
pub fn move_file(from: &Path, to: &Path) -> PlacementResult<()> {
    let move_failed = |source: io::Error| PlacementError::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) if is_cross_device(&rename_err) => {
            debug!(from = %from.display(), "rename crossed filesystems, copying");
            if let Err(copy_err) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(move_failed(copy_err));
            }
            if let Err(remove_err) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(move_failed(remove_err));
            }
            Ok(())
        }
        Err(rename_err) => Err(move_failed(rename_err)),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}
