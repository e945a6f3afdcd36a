//! Arrival debouncing for files that are still being written.
//!
//! Downloads arrive incrementally, so a file is only handed on once it has
//! been quiet for `sort_delay`. Every creation or modification event (re)sets
//! the entry's timestamp; a periodic [`Debouncer::check`] promotes entries
//! whose quiet period has elapsed, that still exist, and that have reached
//! `min_file_size`.
//!
//! Per path the lifecycle is
//! `unseen -> pending -> (stable -> relocated) | (excluded | vanished -> discarded)`.
//! A promoted entry is removed from the pending set while the lock is held,
//! which is what guarantees it is handed on at most once per arrival.
//!
//! Time is passed in explicitly, so tests drive the clock instead of sleeping.

use crate::config::ConfigHandle;
use crate::sorter::{SortOutcome, Sorter};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// A file waiting for its quiet period to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub path: PathBuf,
    /// Time of the most recent creation or modification event.
    pub first_seen: Instant,
}

/// Holds the pending set for one watched source folder.
#[derive(Debug)]
pub struct Debouncer {
    config: ConfigHandle,
    pending: Mutex<HashMap<PathBuf, PendingEntry>>,
}

impl Debouncer {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a creation or modification event for `path` at `now`.
    ///
    /// Directories and excluded names are ignored. Returns true if the path is
    /// pending afterwards.
    pub fn on_event(&self, path: &Path, now: Instant) -> bool {
        if path.is_dir() {
            return false;
        }

        let snapshot = self.config.snapshot();
        if snapshot.exclusions().is_excluded(path) {
            if self.pending().remove(path).is_some() {
                debug!(path = %path.display(), "dropping excluded file");
            }
            return false;
        }

        let mut pending = self.pending();
        match pending.get_mut(path) {
            Some(entry) => {
                entry.first_seen = now;
            }
            None => {
                info!(path = %path.display(), "New file detected");
                pending.insert(
                    path.to_path_buf(),
                    PendingEntry {
                        path: path.to_path_buf(),
                        first_seen: now,
                    },
                );
            }
        }
        true
    }

    /// Drops `path` from the pending set, e.g. after a remove or rename-away event.
    pub fn forget(&self, path: &Path) -> bool {
        self.pending().remove(path).is_some()
    }

    /// Promotes every entry that is stable at `now` and returns their paths.
    ///
    /// Entries whose file no longer exists, has become a directory, or now
    /// matches an exclusion are discarded. Entries below `min_file_size` stay
    /// pending until they grow or disappear.
    pub fn check(&self, now: Instant) -> Vec<PathBuf> {
        let snapshot = self.config.snapshot();
        let config = snapshot.config();
        let delay = config.sort_delay();
        let mut promoted = Vec::new();

        self.pending().retain(|path, entry| {
            if snapshot.exclusions().is_excluded(path) {
                debug!(path = %path.display(), "discarding excluded file");
                return false;
            }

            if now.saturating_duration_since(entry.first_seen) < delay {
                return true;
            }

            match fs::metadata(path) {
                Ok(metadata) if metadata.is_dir() => false,
                Ok(metadata) if metadata.len() < config.min_file_size => {
                    debug!(
                        path = %path.display(),
                        size = metadata.len(),
                        min = config.min_file_size,
                        "file below minimum size, still pending"
                    );
                    true
                }
                Ok(_) => {
                    promoted.push(path.clone());
                    false
                }
                Err(_) => {
                    debug!(path = %path.display(), "pending file vanished");
                    false
                }
            }
        });

        promoted
    }

    /// Runs [`check`](Self::check) and sorts the promoted files on this thread.
    pub fn process_due(&self, now: Instant, sorter: &Sorter) -> Vec<SortOutcome> {
        self.check(now)
            .iter()
            .map(|path| sorter.sort_file(path))
            .collect()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending().contains_key(path)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Restarts the quiet period of every pending entry at `now`.
    ///
    /// Used when watching resumes: changes made while no events were observed
    /// must not count as quiet time. Returns the number of entries re-armed.
    pub fn rearm(&self, now: Instant) -> usize {
        let mut pending = self.pending();
        for entry in pending.values_mut() {
            entry.first_seen = now;
        }
        pending.len()
    }
}
