//! Configuration loading, validation, and hot reload.
//!
//! Configuration is stored as JSON, by default in `~/.sortify/config.json`:
//!
//! ```json
//! {
//!   "source_folder": "/home/me/Downloads",
//!   "destination_folder": "/home/me/Downloads",
//!   "run_at_startup": true,
//!   "categories": { "Documents": [".pdf", ".txt"], "Images": [".png"] },
//!   "exclusions": ["partial", ".crdownload", ".part", ".tmp"],
//!   "min_file_size": 1024,
//!   "sort_delay": 5,
//!   "show_notifications": true,
//!   "date_source": "created",
//!   "scan_mode": "regular",
//!   "scheduled_times": ["09:00", "18:30"],
//!   "scan_when_back_online": true,
//!   "completed_schedules": []
//! }
//! ```
//!
//! A missing file is replaced by defaults, which are written back to disk.
//! Components never read a [`Config`] directly: they take a [`Snapshot`] from a
//! [`ConfigHandle`] at the start of each operation. Reloading swaps in a new
//! snapshot and leaves the previous one untouched for anyone still holding it.

use crate::error::ConfigError;
use crate::file_category::{CategoryResolver, default_categories, normalize_extension};
use crate::path_planner::{DateSource, PathPlanner};
use crate::schedule::{ScanMode, parse_scheduled_times};
use chrono::NaiveTime;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_DIR_NAME: &str = ".sortify";
const CONFIG_FILE_NAME: &str = "config.json";

/// User-facing configuration, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder watched for new arrivals.
    pub source_folder: PathBuf,
    /// Root of the `<year>/<month>/<category>` tree.
    pub destination_folder: PathBuf,
    /// Whether the desktop shell should launch at login. Not used by the core.
    pub run_at_startup: bool,
    /// Category label to extensions.
    pub categories: BTreeMap<String, Vec<String>>,
    /// File name substrings (or glob patterns) that are never processed.
    pub exclusions: Vec<String>,
    /// Files smaller than this many bytes are left alone.
    pub min_file_size: u64,
    /// Seconds a file must stay unchanged before it is sorted.
    pub sort_delay: u64,
    /// Whether the desktop shell should show notifications. Not used by the core.
    pub show_notifications: bool,
    /// Timestamp that decides the year and month folders.
    pub date_source: DateSource,
    /// Watch for arrivals, or sweep at fixed times.
    pub scan_mode: ScanMode,
    /// `HH:MM` local times for scheduled sweeps.
    pub scheduled_times: Vec<String>,
    /// Catch up on scheduled sweeps missed while not running.
    pub scan_when_back_online: bool,
    /// RFC 3339 times of completed scheduled sweeps, oldest first.
    pub completed_schedules: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let downloads = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Downloads");

        Self {
            source_folder: downloads.clone(),
            destination_folder: downloads,
            run_at_startup: true,
            categories: default_categories(),
            exclusions: ["partial", ".crdownload", ".part", ".tmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_file_size: 1024,
            sort_delay: 5,
            show_notifications: true,
            date_source: DateSource::Created,
            scan_mode: ScanMode::Regular,
            scheduled_times: Vec::new(),
            scan_when_back_online: true,
            completed_schedules: Vec::new(),
        }
    }
}

impl Config {
    /// Returns `~/.sortify`, where configuration, logs, and history live.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Returns `~/.sortify/config.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`, writing defaults first if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, if its
    /// contents fail validation, or if defaults cannot be written.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "configuration not found, writing defaults");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses and normalizes configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.normalized()
    }

    /// Writes this configuration to `path` as pretty JSON, creating parents.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        fs::write(path, json).map_err(write_error)
    }

    /// Returns a copy with normalized extensions, after validating it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for duplicate extensions, labels that are
    /// not plain folder names, blank exclusions, exclusion globs that do not
    /// compile, or scheduled times that are not `HH:MM`.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        for extensions in self.categories.values_mut() {
            for ext in extensions.iter_mut() {
                *ext = normalize_extension(ext);
            }
        }

        // Validation happens by building the compiled forms once.
        CategoryResolver::from_table(&self.categories)?;
        ExclusionFilter::new(&self.exclusions)?;
        parse_scheduled_times(&self.scheduled_times)?;
        Ok(self)
    }

    /// The debounce delay as a `Duration`.
    pub fn sort_delay(&self) -> Duration {
        Duration::from_secs(self.sort_delay)
    }

    /// Path planner rooted at the destination folder.
    pub fn planner(&self) -> PathPlanner {
        PathPlanner::new(&self.destination_folder, self.date_source)
    }
}

/// Matches file names against the configured exclusions.
///
/// Plain entries match anywhere in the file name (`.crdownload` excludes
/// `movie.mkv.crdownload`). Entries containing `*`, `?` or `[` are glob
/// patterns matched against the whole file name.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    substrings: Vec<String>,
    patterns: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Compiles exclusion entries.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an entry is blank or a glob is malformed.
    pub fn new(exclusions: &[String]) -> Result<Self, ConfigError> {
        let mut filter = Self::default();

        for entry in exclusions {
            if entry.is_empty() {
                return Err(ConfigError::Invalid {
                    reason: "exclusion patterns must not be empty".to_string(),
                });
            }

            if entry.contains(&['*', '?', '['][..]) {
                let pattern = Pattern::new(entry).map_err(|e| ConfigError::Invalid {
                    reason: format!("invalid exclusion pattern '{}': {}", entry, e),
                })?;
                filter.patterns.push(pattern);
            } else {
                filter.substrings.push(entry.clone());
            }
        }

        Ok(filter)
    }

    /// Returns true if the file's name matches any exclusion.
    pub fn is_excluded(&self, file_path: &Path) -> bool {
        let Some(name) = file_path.file_name().map(|n| n.to_string_lossy()) else {
            return true;
        };

        self.substrings.iter().any(|s| name.contains(s.as_str()))
            || self.patterns.iter().any(|p| p.matches(&name))
    }
}

/// An immutable, validated configuration with its compiled matchers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    config: Config,
    resolver: CategoryResolver,
    exclusions: ExclusionFilter,
    scheduled_times: Vec<NaiveTime>,
}

impl Snapshot {
    /// Validates `config` and compiles its matchers.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let config = config.normalized()?;
        let resolver = CategoryResolver::from_table(&config.categories)?;
        let exclusions = ExclusionFilter::new(&config.exclusions)?;
        let scheduled_times = parse_scheduled_times(&config.scheduled_times)?;
        Ok(Self {
            config,
            resolver,
            exclusions,
            scheduled_times,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    pub fn exclusions(&self) -> &ExclusionFilter {
        &self.exclusions
    }

    pub fn scheduled_times(&self) -> &[NaiveTime] {
        &self.scheduled_times
    }
}

/// Shared access to the current configuration snapshot.
///
/// Cloning the handle shares the same underlying snapshot slot.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    path: Option<PathBuf>,
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl ConfigHandle {
    /// Wraps an in-memory configuration. `reload` keeps it as is.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Ok(Self {
            path: None,
            current: Arc::new(RwLock::new(Arc::new(Snapshot::new(config)?))),
        })
    }

    /// Loads configuration from `path`, falling back to defaults on failure.
    ///
    /// A broken file is not overwritten: the defaults are used in memory and a
    /// warning is logged, so the user can fix the file and reload.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = Config::load(&path)
            .and_then(Snapshot::new)
            .or_else(|e| {
                warn!(error = %e, "using default configuration");
                Snapshot::new(Config::default())
            })
            .unwrap_or_else(|e| {
                warn!(error = %e, "default configuration is invalid, using empty categories");
                Snapshot {
                    config: Config::default(),
                    resolver: CategoryResolver::new(),
                    exclusions: ExclusionFilter::default(),
                    scheduled_times: Vec::new(),
                }
            });

        Self {
            path: Some(path),
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Returns the active snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validates `config` and makes it the active snapshot.
    pub fn replace(&self, config: Config) -> Result<Arc<Snapshot>, ConfigError> {
        let snapshot = Arc::new(Snapshot::new(config)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(snapshot)
    }

    /// Validates `config`, persists it, and makes it the active snapshot.
    pub fn update(&self, config: Config) -> Result<Arc<Snapshot>, ConfigError> {
        let snapshot = Snapshot::new(config)?;
        if let Some(path) = &self.path {
            snapshot.config().save(path)?;
        }
        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(snapshot)
    }

    /// Re-reads the backing file.
    ///
    /// On failure the last known good snapshot stays active and the error is
    /// returned so the caller can surface it.
    pub fn reload(&self) -> Result<Arc<Snapshot>, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot());
        };

        match Config::load(path).and_then(|config| self.replace(config)) {
            Ok(snapshot) => {
                info!(path = %path.display(), "configuration reloaded");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "reload failed, keeping previous configuration"
                );
                Err(e)
            }
        }
    }
}
