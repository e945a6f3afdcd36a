//! Destination directory planning.
//!
//! Files are filed under `<root>/<YYYY>/<MM - MonthName>/<Category>`, where the
//! date comes from the file's timestamp in local time.

use crate::error::{SortError, SortResult};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which file timestamp decides the year and month folders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    /// Creation time, or modification time where creation time is unavailable.
    #[default]
    Created,
    /// Modification time.
    Modified,
}

/// Formats the month folder name, e.g. `04 - April`.
pub fn month_folder_name(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%m - %B").to_string()
}

/// Computes and creates destination directories under a root.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    destination_root: PathBuf,
    date_source: DateSource,
}

impl PathPlanner {
    pub fn new(destination_root: impl Into<PathBuf>, date_source: DateSource) -> Self {
        Self {
            destination_root: destination_root.into(),
            date_source,
        }
    }

    /// Returns the timestamp that places a file in the tree.
    pub fn file_timestamp(&self, metadata: &Metadata) -> io::Result<DateTime<Local>> {
        let time = match self.date_source {
            DateSource::Created => metadata.created().or_else(|_| metadata.modified())?,
            DateSource::Modified => metadata.modified()?,
        };
        Ok(DateTime::<Local>::from(time))
    }

    /// Computes the destination directory without touching the filesystem.
    pub fn destination_dir(&self, timestamp: &DateTime<Local>, category: &str) -> PathBuf {
        self.destination_root
            .join(timestamp.format("%Y").to_string())
            .join(month_folder_name(timestamp))
            .join(category)
    }

    /// Plans the destination directory for `file_path` and makes sure it exists.
    ///
    /// # Errors
    ///
    /// * `SortError::SourceVanished` if the file's metadata can no longer be read
    ///   because it is gone
    /// * `SortError::DestinationCreationFailed` if the directory cannot be created
    pub fn plan(&self, file_path: &Path, category: &str) -> SortResult<PathBuf> {
        let metadata = fs::metadata(file_path).map_err(|e| vanished_or_failed(file_path, e))?;
        let timestamp = self
            .file_timestamp(&metadata)
            .map_err(|e| vanished_or_failed(file_path, e))?;

        let target_dir = self.destination_dir(&timestamp, category);
        ensure_dir(&target_dir)?;
        Ok(target_dir)
    }
}

/// Creates `path` and all of its parents. Succeeds if it already exists.
pub fn ensure_dir(path: &Path) -> SortResult<()> {
    if path.is_dir() {
        return Ok(());
    }

    debug!(path = %path.display(), "creating destination directory");
    fs::create_dir_all(path).map_err(|e| SortError::DestinationCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn vanished_or_failed(file_path: &Path, error: io::Error) -> SortError {
    if error.kind() == io::ErrorKind::NotFound {
        SortError::SourceVanished {
            path: file_path.to_path_buf(),
        }
    } else {
        SortError::MoveFailed {
            source_path: file_path.to_path_buf(),
            destination: PathBuf::new(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn april_tenth() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 4, 10, 12, 0, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn test_month_folder_name() {
        assert_eq!(month_folder_name(&april_tenth()), "04 - April");
    }

    #[test]
    fn test_destination_dir_layout() {
        let planner = PathPlanner::new("/dest", DateSource::Created);
        assert_eq!(
            planner.destination_dir(&april_tenth(), "Documents"),
            PathBuf::from("/dest/2025/04 - April/Documents")
        );
    }

    #[test]
    fn test_destination_dir_is_deterministic() {
        let planner = PathPlanner::new("/dest", DateSource::Created);
        let first = planner.destination_dir(&april_tenth(), "Images");
        let second = planner.destination_dir(&april_tenth(), "Images");
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_creates_directory_and_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("report.pdf");
        fs::write(&source, "pdf").expect("Failed to write test file");

        let planner = PathPlanner::new(temp_dir.path().join("dest"), DateSource::Modified);
        let first = planner.plan(&source, "Documents").expect("first plan");
        assert!(first.is_dir());

        let second = planner.plan(&source, "Documents").expect("second plan");
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_uses_modified_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("report.pdf");
        fs::write(&source, "pdf").expect("Failed to write test file");
        let file = fs::File::options()
            .write(true)
            .open(&source)
            .expect("Failed to open test file");
        file.set_modified(april_tenth().into())
            .expect("Failed to set modification time");

        let planner = PathPlanner::new(temp_dir.path(), DateSource::Modified);
        let target = planner.plan(&source, "Documents").expect("plan");
        assert_eq!(target, temp_dir.path().join("2025/04 - April/Documents"));
    }

    #[test]
    fn test_plan_missing_file_is_source_vanished() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let planner = PathPlanner::new(temp_dir.path(), DateSource::Created);

        let result = planner.plan(&temp_dir.path().join("gone.txt"), "Documents");
        assert!(matches!(result, Err(SortError::SourceVanished { .. })));
    }

    #[test]
    fn test_ensure_dir_fails_when_a_file_is_in_the_way() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blocker = temp_dir.path().join("blocked");
        fs::write(&blocker, "not a directory").expect("Failed to write blocker");

        let result = ensure_dir(&blocker.join("child"));
        assert!(matches!(
            result,
            Err(SortError::DestinationCreationFailed { .. })
        ));
    }
}
