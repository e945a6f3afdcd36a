//! sortify - keeps a downloads folder tidy
//!
//! This library watches a source folder, waits until new files stop changing,
//! classifies them by extension, and moves them into
//! `<destination>/<YYYY>/<MM - MonthName>/<Category>/` without ever overwriting
//! an existing file. The same pipeline can sort a whole directory on demand.

pub mod cli;
pub mod config;
pub mod debouncer;
pub mod error;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod path_planner;
pub mod scanner;
pub mod schedule;
pub mod sorter;
pub mod stats;

pub use config::{Config, ConfigHandle, ExclusionFilter, Snapshot};
pub use debouncer::Debouncer;
pub use error::{ConfigError, SortError};
pub use file_category::CategoryResolver;
pub use file_organizer::Relocator;
pub use monitor::FileMonitor;
pub use path_planner::{DateSource, PathPlanner};
pub use scanner::{ScanSummary, sort_directory};
pub use schedule::ScanMode;
pub use sorter::{EventSink, SortEvent, SortOutcome, Sorter};
pub use stats::SortingStats;

pub use cli::{Cli, run_cli};
