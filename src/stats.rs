//! Statistics about sorted files.
//!
//! [`SortingStats`] is an [`EventSink`] that keeps per-category totals and the
//! most recent moves in memory, and optionally appends every successful move
//! to a JSON-lines history file so totals survive restarts.

use crate::sorter::{EventSink, SortEvent, SortOutcome};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Number of recent moves kept in memory.
pub const RECENT_LIMIT: usize = 10;

/// Files and bytes sorted into one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub files: usize,
    pub bytes: u64,
}

/// A point-in-time copy of the statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    pub failed_files: usize,
    pub by_category: BTreeMap<String, CategoryTotals>,
    /// Newest first.
    pub recent: Vec<SortOutcome>,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_files: usize,
    total_bytes: u64,
    failed_files: usize,
    by_category: BTreeMap<String, CategoryTotals>,
    recent: VecDeque<SortOutcome>,
}

impl StatsInner {
    fn add_success(&mut self, outcome: &SortOutcome) {
        self.total_files += 1;
        self.total_bytes += outcome.size_bytes;

        let totals = self.by_category.entry(outcome.category.clone()).or_default();
        totals.files += 1;
        totals.bytes += outcome.size_bytes;

        self.recent.push_front(outcome.clone());
        self.recent.truncate(RECENT_LIMIT);
    }
}

/// Aggregates sort outcomes.
#[derive(Debug, Default)]
pub struct SortingStats {
    history_path: Option<PathBuf>,
    inner: Mutex<StatsInner>,
}

impl SortingStats {
    /// In-memory statistics only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics that append successful moves to `history_path`.
    pub fn with_history(history_path: impl Into<PathBuf>) -> Self {
        Self {
            history_path: Some(history_path.into()),
            inner: Mutex::new(StatsInner::default()),
        }
    }

    /// Rebuilds statistics from an existing history file and keeps appending to it.
    ///
    /// A missing file yields empty statistics. Malformed lines are skipped.
    pub fn load_history(history_path: &Path) -> io::Result<Self> {
        let stats = Self::with_history(history_path);
        let content = match fs::read_to_string(history_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };

        {
            let mut inner = stats.inner();
            for (line_no, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SortOutcome>(line) {
                    Ok(outcome) => inner.add_success(&outcome),
                    Err(e) => {
                        warn!(line = line_no + 1, error = %e, "skipping malformed history line")
                    }
                }
            }
        }

        Ok(stats)
    }

    fn inner(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one outcome. Skipped files are not counted.
    pub fn record_outcome(&self, outcome: &SortOutcome) {
        if outcome.success {
            self.inner().add_success(outcome);
            if let Some(path) = &self.history_path
                && let Err(e) = append_line(path, outcome)
            {
                warn!(path = %path.display(), error = %e, "could not append to history");
            }
        } else if outcome.is_failure() {
            self.inner().failed_files += 1;
        }
    }

    pub fn summary(&self) -> StatsSummary {
        let inner = self.inner();
        StatsSummary {
            total_files: inner.total_files,
            total_bytes: inner.total_bytes,
            failed_files: inner.failed_files,
            by_category: inner.by_category.clone(),
            recent: inner.recent.iter().cloned().collect(),
        }
    }
}

impl EventSink for SortingStats {
    fn record(&self, event: &SortEvent) {
        if let SortEvent::Sorted(outcome) = event {
            self.record_outcome(outcome);
        }
    }
}

fn append_line(path: &Path, outcome: &SortOutcome) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let line = serde_json::to_string(outcome).map_err(io::Error::other)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}
