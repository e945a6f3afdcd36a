//! The classify, plan, relocate sequence shared by the debouncer and scanner.
//!
//! [`Sorter::sort_file`] is the per-file error boundary: whatever goes wrong
//! with one file becomes a [`SortOutcome`] and is reported to every registered
//! [`EventSink`]. It holds no mutable state of its own, so one `Sorter` can be
//! shared between the monitor's worker thread and a bulk scan.

use crate::config::{ConfigHandle, Snapshot};
use crate::error::{SortError, SortResult};
use crate::file_organizer::Relocator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tracing::{debug, warn};

/// The result of processing one file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOutcome {
    pub original_path: PathBuf,
    /// Where the file ended up, or where it was headed when the move failed.
    pub destination_path: Option<PathBuf>,
    pub category: String,
    pub success: bool,
    /// True when the file was gone before it could be moved.
    #[serde(default)]
    pub skipped: bool,
    pub error_detail: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    pub sorted_at: DateTime<Utc>,
}

impl SortOutcome {
    fn sorted(
        original_path: &Path,
        destination: PathBuf,
        category: &str,
        size_bytes: u64,
    ) -> Self {
        Self {
            original_path: original_path.to_path_buf(),
            destination_path: Some(destination),
            category: category.to_string(),
            success: true,
            skipped: false,
            error_detail: None,
            size_bytes,
            sorted_at: Utc::now(),
        }
    }

    fn from_error(
        original_path: &Path,
        category: &str,
        size_bytes: u64,
        error: &SortError,
    ) -> Self {
        let destination_path = match error {
            SortError::DestinationCreationFailed { path, .. } => Some(path.clone()),
            SortError::MoveFailed { destination, .. } if !destination.as_os_str().is_empty() => {
                Some(destination.clone())
            }
            _ => None,
        };

        Self {
            original_path: original_path.to_path_buf(),
            destination_path,
            category: category.to_string(),
            success: false,
            skipped: error.is_skip(),
            error_detail: Some(error.to_string()),
            size_bytes,
            sorted_at: Utc::now(),
        }
    }

    /// True if the file failed to move (as opposed to moving or vanishing).
    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// Events emitted to collaborators such as the statistics recorder or a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEvent {
    /// One file was processed.
    Sorted(SortOutcome),
    /// A bulk sort finished.
    BulkFinished {
        directory: PathBuf,
        success: usize,
        errors: usize,
    },
}

/// Receives sort events. Implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &SortEvent);
}

impl EventSink for Sender<SortEvent> {
    fn record(&self, event: &SortEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(event.clone());
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, event: &SortEvent) {
        (**self).record(event);
    }
}

/// Runs the classify, plan, relocate sequence for single files.
pub struct Sorter {
    config: ConfigHandle,
    sinks: Vec<Box<dyn EventSink>>,
}

impl Sorter {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    /// Adds a collaborator that receives every event.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Sorts one file into `<dest>/<year>/<month>/<category>/`.
    ///
    /// Never fails: errors are reported in the returned outcome.
    pub fn sort_file(&self, file_path: &Path) -> SortOutcome {
        let snapshot = self.config.snapshot();
        let category = snapshot.resolver().resolve(file_path).to_string();
        let size_bytes = fs::metadata(file_path).map(|m| m.len()).unwrap_or(0);

        let outcome = match Self::try_sort(&snapshot, file_path, &category) {
            Ok(destination) => SortOutcome::sorted(file_path, destination, &category, size_bytes),
            Err(e) => {
                if e.is_skip() {
                    debug!(path = %file_path.display(), "file vanished before sorting");
                } else {
                    warn!(path = %file_path.display(), error = %e, "failed to sort file");
                }
                SortOutcome::from_error(file_path, &category, size_bytes, &e)
            }
        };

        self.emit(&SortEvent::Sorted(outcome.clone()));
        outcome
    }

    fn try_sort(snapshot: &Snapshot, file_path: &Path, category: &str) -> SortResult<PathBuf> {
        if !file_path.exists() {
            return Err(SortError::SourceVanished {
                path: file_path.to_path_buf(),
            });
        }

        let target_dir = snapshot.config().planner().plan(file_path, category)?;
        Relocator::relocate(file_path, &target_dir).map(|moved| moved.new_path)
    }

    /// Sends an event to every sink.
    pub fn emit(&self, event: &SortEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}
