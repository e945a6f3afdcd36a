//! Background monitoring of the source folder.
//!
//! In [`ScanMode::Regular`] a running [`FileMonitor`] owns three threads:
//!
//! * an event thread that turns `notify` events into [`Debouncer`] updates,
//! * a tick thread that runs [`Debouncer::check`] once per interval,
//! * a worker thread that sorts promoted files, so a slow destination never
//!   delays event handling.
//!
//! In [`ScanMode::Scheduled`] there is no watch. A single schedule thread
//! sweeps the whole folder when a configured time comes around.
//!
//! [`FileMonitor::stop`] signals the tick (or schedule) thread, waits for it
//! so no check starts afterwards, drops the watch subscription, and then lets
//! the worker finish any move already handed to it.

use crate::config::ConfigHandle;
use crate::debouncer::Debouncer;
use crate::error::{ConfigError, SortError, SortResult};
use crate::scanner::{self, ScanSummary};
use crate::schedule::{
    SCHEDULE_CHECK_INTERVAL, ScanMode, Schedule, missed_schedules, record_completed,
};
use crate::sorter::Sorter;
use chrono::{DateTime, Local};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often pending files are checked for stability.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// What a filesystem event means for the pending set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// A file appeared or changed.
    Arrived(PathBuf),
    /// A file went away or was renamed away.
    Departed(PathBuf),
}

/// Classifies a `notify` event into pending-set actions.
pub fn classify_event(event: &Event) -> Vec<EventAction> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(EventAction::Arrived).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(EventAction::Departed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut actions = Vec::new();
            if let Some(from) = event.paths.first() {
                actions.push(EventAction::Departed(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                actions.push(EventAction::Arrived(to.clone()));
            }
            actions
        }
        EventKind::Modify(_) => event.paths.iter().cloned().map(EventAction::Arrived).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(EventAction::Departed).collect(),
        _ => Vec::new(),
    }
}

/// Applies one `notify` event to the debouncer.
pub fn apply_event(debouncer: &Debouncer, event: &Event, now: Instant) {
    for action in classify_event(event) {
        match action {
            EventAction::Arrived(path) => {
                debouncer.on_event(&path, now);
            }
            EventAction::Departed(path) => {
                if debouncer.forget(&path) {
                    debug!(path = %path.display(), "pending file went away");
                }
            }
        }
    }
}

/// Threads and subscriptions owned by a running monitor.
enum Workers {
    Watching {
        watcher: RecommendedWatcher,
        tick: JoinHandle<()>,
        events: JoinHandle<()>,
        worker: JoinHandle<()>,
    },
    Scheduled {
        scheduler: JoinHandle<()>,
    },
}

struct Running {
    source_folder: PathBuf,
    scan_mode: ScanMode,
    stop_tx: Sender<()>,
    workers: Workers,
}

/// Watches one source folder and sorts files as they finish arriving, or
/// sweeps it at scheduled times.
pub struct FileMonitor {
    config: ConfigHandle,
    sorter: Arc<Sorter>,
    debouncer: Arc<Debouncer>,
    check_interval: Duration,
    schedule_interval: Duration,
    running: Option<Running>,
}

impl FileMonitor {
    pub fn new(sorter: Arc<Sorter>) -> Self {
        let config = sorter.config().clone();
        Self {
            debouncer: Arc::new(Debouncer::new(config.clone())),
            config,
            sorter,
            check_interval: CHECK_INTERVAL,
            schedule_interval: SCHEDULE_CHECK_INTERVAL,
            running: None,
        }
    }

    /// Overrides the stability check interval.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Overrides how often scheduled mode checks for a due sweep.
    pub fn with_schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts monitoring the configured source folder in the configured
    /// mode. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns `SortError::InvalidDirectory` if the source folder is missing
    /// and `SortError::Watch` if the subscription cannot be created.
    pub fn start(&mut self) -> SortResult<()> {
        if self.running.is_some() {
            info!("File monitor already running");
            return Ok(());
        }

        let snapshot = self.config.snapshot();
        let source_folder = snapshot.config().source_folder.clone();
        if !source_folder.is_dir() {
            return Err(SortError::InvalidDirectory {
                path: source_folder,
            });
        }

        let scan_mode = snapshot.config().scan_mode;
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let workers = match scan_mode {
            ScanMode::Regular => self.start_watching(&source_folder, stop_rx)?,
            ScanMode::Scheduled => self.start_schedule(stop_rx)?,
        };

        info!(path = %source_folder.display(), mode = ?scan_mode, "Started file monitor");
        self.running = Some(Running {
            source_folder,
            scan_mode,
            stop_tx,
            workers,
        });
        Ok(())
    }

    fn start_watching(
        &self,
        source_folder: &Path,
        stop_rx: Receiver<()>,
    ) -> SortResult<Workers> {
        // Nothing was observed while stopped, so no pending file has been
        // quiet for a known time.
        let rearmed = self.debouncer.rearm(Instant::now());
        if rearmed > 0 {
            debug!(pending = rearmed, "restarted quiet period of pending files");
        }

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(event_tx)?;
        watcher.watch(source_folder, RecursiveMode::NonRecursive)?;

        let debouncer = self.debouncer.clone();
        let events = spawn_named("sortify-events", move || {
            for result in event_rx {
                match result {
                    Ok(event) => apply_event(&debouncer, &event, Instant::now()),
                    Err(e) => warn!(error = %e, "watch error"),
                }
            }
        })?;

        let (work_tx, work_rx) = mpsc::channel::<PathBuf>();
        let sorter = self.sorter.clone();
        let worker = spawn_named("sortify-worker", move || {
            for path in work_rx {
                sorter.sort_file(&path);
            }
        })?;

        let debouncer = self.debouncer.clone();
        let interval = self.check_interval;
        let tick = spawn_named("sortify-tick", move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        for path in debouncer.check(Instant::now()) {
                            if work_tx.send(path).is_err() {
                                error!("sort worker stopped unexpectedly");
                                return;
                            }
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        })?;

        Ok(Workers::Watching {
            watcher,
            tick,
            events,
            worker,
        })
    }

    fn start_schedule(&self, stop_rx: Receiver<()>) -> SortResult<Workers> {
        let config = self.config.clone();
        let sorter = self.sorter.clone();
        let interval = self.schedule_interval;

        let scheduler = spawn_named("sortify-schedule", move || {
            let snapshot = config.snapshot();
            if snapshot.config().scan_when_back_online {
                let missed = missed_schedules(
                    snapshot.scheduled_times(),
                    &snapshot.config().completed_schedules,
                    Local::now(),
                );
                if !missed.is_empty() {
                    info!(missed = missed.len(), "Running catch-up scan for missed schedules");
                    scheduled_sweep(&sorter, &config, &missed);
                }
            }
            drop(snapshot);

            let mut schedule = Schedule::new();
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let times = config.snapshot().scheduled_times().to_vec();
                        if let Some(slot) = schedule.due(&times, Local::now()) {
                            info!(slot = %slot.format("%H:%M"), "Running scheduled scan");
                            scheduled_sweep(&sorter, &config, &[slot]);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        })?;

        Ok(Workers::Scheduled { scheduler })
    }

    /// Stops monitoring. Moves and sweeps already in progress run to completion.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(());
        match running.workers {
            Workers::Watching {
                watcher,
                tick,
                events,
                worker,
            } => {
                join_logged(tick, "tick");
                drop(watcher);
                join_logged(events, "event");
                join_logged(worker, "worker");
            }
            Workers::Scheduled { scheduler } => join_logged(scheduler, "schedule"),
        }

        info!(path = %running.source_folder.display(), "Stopped file monitoring");
    }

    /// Sorts everything currently in `directory` (default: the source folder).
    ///
    /// Safe to call while monitoring; both paths share the same sorter.
    pub fn sort_now(&self, directory: Option<&Path>) -> SortResult<ScanSummary> {
        let directory = match directory {
            Some(dir) => dir.to_path_buf(),
            None => self.config.snapshot().config().source_folder.clone(),
        };
        scanner::sort_directory(&self.sorter, &directory)
    }

    /// Re-reads configuration, restarting if the source folder or mode changed.
    pub fn reload_config(&mut self) -> Result<(), ConfigError> {
        let snapshot = self.config.reload()?;
        let config = snapshot.config();

        let changed = self.running.as_ref().is_some_and(|r| {
            r.source_folder != config.source_folder || r.scan_mode != config.scan_mode
        });

        if changed {
            info!("source folder or scan mode changed, restarting monitor");
            self.stop();
            if let Err(e) = self.start() {
                error!(error = %e, "could not restart monitor");
            }
        }
        Ok(())
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sorts the source folder for the given schedule slots and records them as
/// completed.
fn scheduled_sweep(sorter: &Sorter, config: &ConfigHandle, slots: &[DateTime<Local>]) {
    let snapshot = config.snapshot();
    match scanner::sort_directory(sorter, &snapshot.config().source_folder) {
        Ok(summary) => info!(
            success = summary.success,
            errors = summary.errors,
            "Scheduled scan completed"
        ),
        Err(e) => error!(error = %e, "scheduled scan failed"),
    }

    let mut updated = snapshot.config().clone();
    for slot in slots {
        record_completed(&mut updated.completed_schedules, *slot);
    }
    if let Err(e) = config.update(updated) {
        warn!(error = %e, "could not record completed schedule");
    }
}

fn spawn_named<F>(name: &str, f: F) -> SortResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(SortError::Spawn)
}

fn join_logged(handle: JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        error!(thread = name, "monitor thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, p| event.add_path(PathBuf::from(p)))
    }

    #[test]
    fn test_classify_create_and_modify() {
        assert_eq!(
            classify_event(&event(EventKind::Create(CreateKind::File), &["/dl/a.pdf"])),
            vec![EventAction::Arrived(PathBuf::from("/dl/a.pdf"))]
        );
        assert_eq!(
            classify_event(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/dl/a.pdf"]
            )),
            vec![EventAction::Arrived(PathBuf::from("/dl/a.pdf"))]
        );
    }

    #[test]
    fn test_classify_rename_and_remove() {
        assert_eq!(
            classify_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/dl/a.pdf.crdownload", "/dl/a.pdf"]
            )),
            vec![
                EventAction::Departed(PathBuf::from("/dl/a.pdf.crdownload")),
                EventAction::Arrived(PathBuf::from("/dl/a.pdf")),
            ]
        );
        assert_eq!(
            classify_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &["/dl/a.pdf"]
            )),
            vec![EventAction::Departed(PathBuf::from("/dl/a.pdf"))]
        );
        assert_eq!(
            classify_event(&event(EventKind::Remove(RemoveKind::File), &["/dl/a.pdf"])),
            vec![EventAction::Departed(PathBuf::from("/dl/a.pdf"))]
        );
        assert!(classify_event(&event(EventKind::Other, &["/dl/a.pdf"])).is_empty());
    }

    #[test]
    fn test_apply_event_updates_pending_set() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = temp_dir.path().join("a.pdf");
        fs::write(&file, "data").expect("write");

        let debouncer = Debouncer::new(ConfigHandle::new(Config::default()).expect("config"));
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        apply_event(&debouncer, &created, Instant::now());
        assert!(debouncer.is_pending(&file));

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());
        apply_event(&debouncer, &removed, Instant::now());
        assert!(!debouncer.is_pending(&file));
    }

    #[test]
    fn test_start_requires_existing_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            source_folder: temp_dir.path().join("missing"),
            ..Config::default()
        };
        let sorter = Arc::new(Sorter::new(ConfigHandle::new(config).expect("config")));
        let mut monitor = FileMonitor::new(sorter);

        assert!(matches!(
            monitor.start(),
            Err(SortError::InvalidDirectory { .. })
        ));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_start_stop_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            source_folder: temp_dir.path().to_path_buf(),
            destination_folder: temp_dir.path().join("sorted"),
            ..Config::default()
        };
        let sorter = Arc::new(Sorter::new(ConfigHandle::new(config).expect("config")));
        let mut monitor = FileMonitor::new(sorter).with_check_interval(Duration::from_millis(20));

        monitor.start().expect("start");
        monitor.start().expect("second start is a no-op");
        assert!(monitor.is_running());

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_resume_restarts_quiet_period() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            source_folder: temp_dir.path().to_path_buf(),
            destination_folder: temp_dir.path().join("sorted"),
            min_file_size: 0,
            sort_delay: 2,
            ..Config::default()
        };
        let sorter = Arc::new(Sorter::new(ConfigHandle::new(config).expect("config")));
        let mut monitor = FileMonitor::new(sorter).with_check_interval(Duration::from_millis(20));

        // Seen long ago, then modified while paused.
        let file = temp_dir.path().join("report.pdf");
        fs::write(&file, "partial").expect("write");
        let long_ago = Instant::now()
            .checked_sub(Duration::from_secs(10))
            .expect("monotonic clock far enough from its origin");
        monitor.debouncer().on_event(&file, long_ago);
        fs::write(&file, "partial, then more").expect("write");

        monitor.start().expect("start");
        thread::sleep(Duration::from_millis(300));

        assert!(file.exists());
        assert!(monitor.debouncer().is_pending(&file));
        monitor.stop();
    }

    #[test]
    fn test_scheduled_mode_catches_up_missed_sweep() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("downloads");
        fs::create_dir(&source).expect("create source");
        let file = source.join("report.pdf");
        fs::write(&file, "report").expect("write");

        let last_run = Local::now()
            .checked_sub_days(chrono::Days::new(3))
            .expect("date in range");
        let config = Config {
            source_folder: source.clone(),
            destination_folder: temp_dir.path().join("sorted"),
            scan_mode: ScanMode::Scheduled,
            scheduled_times: vec!["03:00".to_string()],
            scan_when_back_online: true,
            completed_schedules: vec![last_run.to_rfc3339()],
            ..Config::default()
        };
        let handle = ConfigHandle::new(config).expect("config");
        let sorter = Arc::new(Sorter::new(handle.clone()));
        let mut monitor =
            FileMonitor::new(sorter).with_schedule_interval(Duration::from_millis(20));

        monitor.start().expect("start");
        let deadline = Instant::now() + Duration::from_secs(10);
        while file.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        monitor.stop();

        assert!(!file.exists());
        assert!(handle.snapshot().config().completed_schedules.len() > 1);
        assert!(!monitor.debouncer().is_pending(&file));
    }

    #[test]
    fn test_scheduled_mode_does_not_watch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            source_folder: temp_dir.path().to_path_buf(),
            destination_folder: temp_dir.path().join("sorted"),
            min_file_size: 0,
            sort_delay: 0,
            scan_mode: ScanMode::Scheduled,
            ..Config::default()
        };
        let sorter = Arc::new(Sorter::new(ConfigHandle::new(config).expect("config")));
        let mut monitor = FileMonitor::new(sorter)
            .with_check_interval(Duration::from_millis(20))
            .with_schedule_interval(Duration::from_millis(20));

        monitor.start().expect("start");
        let file = temp_dir.path().join("report.pdf");
        fs::write(&file, "report").expect("write");
        thread::sleep(Duration::from_millis(300));
        monitor.stop();

        assert!(file.exists());
        assert_eq!(monitor.debouncer().pending_count(), 0);
    }
}
