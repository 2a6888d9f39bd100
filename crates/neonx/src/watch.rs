use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use backdrop::WindowRuntime;
use effectconfig::BackdropConfig;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

pub const DEBOUNCE: Duration = Duration::from_millis(200);
/// How often the watch loop checks whether the window has closed.
const TICK: Duration = Duration::from_millis(250);

/// Folds a burst of filesystem events for one file into a single change.
#[derive(Debug)]
struct ChangeFilter {
    file_name: OsString,
    delay: Duration,
    deadline: Option<Instant>,
}

impl ChangeFilter {
    fn new(file_name: OsString, delay: Duration) -> Self {
        Self {
            file_name,
            delay,
            deadline: None,
        }
    }

    fn matches(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(self.file_name.as_os_str()))
    }

    /// Returns whether the event concerns the watched file; if so the
    /// quiet period restarts.
    fn observe(&mut self, event: &Event, now: Instant) -> bool {
        if !self.matches(event) {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// How long to block for the next event. A pending change is waited
    /// out in full; otherwise `idle` applies.
    fn wait(&self, now: Instant, idle: Duration) -> Duration {
        self.deadline
            .map_or(idle, |deadline| deadline.saturating_duration_since(now))
    }
}

/// Watches the directory holding a configuration file and reports debounced
/// changes to that file. Watching the directory keeps working across editors
/// that save by renaming a temporary file over the original.
pub struct ConfigWatcher {
    path: PathBuf,
    filter: ChangeFilter,
    events: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file_name = path
            .file_name()
            .with_context(|| format!("{} does not name a file", path.display()))?
            .to_os_string();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = mpsc::channel();
        let mut watcher = recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .context("failed to create file watcher")?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", directory.display()))?;

        Ok(Self {
            path,
            filter: ChangeFilter::new(file_name, DEBOUNCE),
            events,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks up to `timeout` for a settled change to the file. A change
    /// that starts settling before the timeout is waited out.
    pub fn next_change(&mut self, timeout: Duration) -> bool {
        let end = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if self.filter.take_due(now) {
                return true;
            }
            if now >= end && self.filter.deadline.is_none() {
                return false;
            }
            let wait = self.filter.wait(now, end.saturating_duration_since(now));
            match self.events.recv_timeout(wait) {
                Ok(Ok(event)) => {
                    if self.filter.observe(&event, Instant::now()) {
                        debug!(kind = ?event.kind, "configuration file event");
                    }
                }
                Ok(Err(err)) => warn!("file watcher error: {err}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

/// Forwards reloads to the window until it closes. A file that fails to parse
/// or validate is logged and the running configuration is kept.
pub fn watch_until_closed<F>(
    runtime: &WindowRuntime,
    mut watcher: ConfigWatcher,
    mut reload: F,
) -> Result<()>
where
    F: FnMut(&Path) -> Result<BackdropConfig>,
{
    info!(path = %watcher.path().display(), "watching configuration");
    while !runtime.is_finished() {
        if !watcher.next_change(TICK) {
            continue;
        }
        debug!(path = %watcher.path().display(), "configuration changed");
        match reload(watcher.path()) {
            Ok(config) => {
                if runtime.reconfigure(config).is_err() {
                    break;
                }
            }
            Err(err) => warn!("ignoring configuration change: {err:#}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn filter() -> ChangeFilter {
        ChangeFilter::new(OsString::from("neonx.toml"), DEBOUNCE)
    }

    fn modified(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.into())
    }

    #[test]
    fn only_events_for_the_config_file_count() {
        let mut filter = filter();
        let now = Instant::now();
        assert!(!filter.observe(&modified("/cfg/other.toml"), now));
        assert!(!filter.observe(
            &Event::new(EventKind::Remove(RemoveKind::File)).add_path("/cfg/neonx.toml".into()),
            now
        ));
        assert!(!filter.take_due(now + DEBOUNCE));

        assert!(filter.observe(
            &Event::new(EventKind::Create(CreateKind::File)).add_path("/cfg/neonx.toml".into()),
            now
        ));
        assert!(filter.take_due(now + DEBOUNCE));
    }

    #[test]
    fn bursts_settle_into_one_change() {
        let mut filter = filter();
        let start = Instant::now();
        filter.observe(&modified("/cfg/neonx.toml"), start);
        filter.observe(&modified("/cfg/neonx.toml"), start + Duration::from_millis(150));
        assert!(!filter.take_due(start + DEBOUNCE));

        let settled = start + Duration::from_millis(150) + DEBOUNCE;
        assert!(filter.take_due(settled));
        assert!(!filter.take_due(settled + DEBOUNCE));
    }

    #[test]
    fn pending_change_overrides_the_idle_wait() {
        let mut filter = filter();
        let now = Instant::now();
        assert_eq!(filter.wait(now, TICK), TICK);
        filter.observe(&modified("/cfg/neonx.toml"), now);
        assert_eq!(filter.wait(now, Duration::from_secs(5)), DEBOUNCE);
        assert_eq!(filter.wait(now, Duration::ZERO), DEBOUNCE);
        assert_eq!(filter.wait(now + DEBOUNCE, TICK), Duration::ZERO);
    }

    #[test]
    fn writes_to_the_file_are_reported() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("neonx.toml");
        fs::write(&path, "").unwrap();

        let mut watcher = ConfigWatcher::new(path.clone()).unwrap();
        assert!(!watcher.next_change(Duration::from_millis(50)));

        fs::write(&path, "[window]\nwidth = 800\n").unwrap();
        assert!(watcher.next_change(Duration::from_secs(5)));
    }
}
