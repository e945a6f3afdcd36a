//! One-shot sorting of everything already in a directory.
//!
//! Only immediate regular files are considered: subdirectories and symlinks
//! are left alone, and excluded names are skipped the same way the debouncer
//! skips them. One file failing never stops the sweep.

use crate::error::{SortError, SortResult};
use crate::sorter::{SortEvent, SortOutcome, Sorter};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tally of a bulk sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files moved.
    pub success: usize,
    /// Files that could not be moved.
    pub errors: usize,
    /// Files that vanished mid-scan or matched an exclusion.
    pub skipped: usize,
}

impl ScanSummary {
    /// `(success_count, error_count)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.success, self.errors)
    }

    fn add(&mut self, outcome: &SortOutcome) {
        if outcome.success {
            self.success += 1;
        } else if outcome.skipped {
            self.skipped += 1;
        } else {
            self.errors += 1;
        }
    }
}

/// Lists the files a bulk sort of `directory` would process.
///
/// # Errors
///
/// Returns `SortError::InvalidDirectory` if `directory` is missing, is not a
/// directory, or cannot be read.
pub fn collect_candidates(sorter: &Sorter, directory: &Path) -> SortResult<(Vec<PathBuf>, usize)> {
    if !directory.is_dir() {
        return Err(SortError::InvalidDirectory {
            path: directory.to_path_buf(),
        });
    }

    let entries = fs::read_dir(directory).map_err(|e| {
        warn!(path = %directory.display(), error = %e, "cannot read directory");
        SortError::InvalidDirectory {
            path: directory.to_path_buf(),
        }
    })?;

    let snapshot = sorter.config().snapshot();
    let mut files = Vec::new();
    let mut excluded = 0;

    for entry in entries.flatten() {
        if let Ok(file_type) = entry.file_type()
            && file_type.is_file()
        {
            let path = entry.path();
            if snapshot.exclusions().is_excluded(&path) {
                excluded += 1;
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok((files, excluded))
}

/// Sorts every file in `directory`.
pub fn sort_directory(sorter: &Sorter, directory: &Path) -> SortResult<ScanSummary> {
    sort_directory_with(sorter, directory, |_| {})
}

/// Sorts every file in `directory`, calling `on_outcome` after each one.
///
/// # Errors
///
/// Returns `SortError::InvalidDirectory` if `directory` cannot be listed. Per
/// file failures are counted in the summary instead.
pub fn sort_directory_with<F>(
    sorter: &Sorter,
    directory: &Path,
    mut on_outcome: F,
) -> SortResult<ScanSummary>
where
    F: FnMut(&SortOutcome),
{
    let (files, excluded) = collect_candidates(sorter, directory)?;
    info!(path = %directory.display(), files = files.len(), "Bulk sort started");

    let mut summary = ScanSummary {
        skipped: excluded,
        ..ScanSummary::default()
    };

    for file in &files {
        let outcome = sorter.sort_file(file);
        summary.add(&outcome);
        on_outcome(&outcome);
    }

    info!(
        path = %directory.display(),
        success = summary.success,
        errors = summary.errors,
        skipped = summary.skipped,
        "Bulk sort complete"
    );

    sorter.emit(&SortEvent::BulkFinished {
        directory: directory.to_path_buf(),
        success: summary.success,
        errors: summary.errors,
    });

    Ok(summary)
}
