//! Polling change detection that drives rebuilds.
//!
//! The watcher keeps a [`WatchState`] of every file under the watched paths
//! and compares it against a fresh scan on each tick. Any difference triggers
//! exactly one synchronous rebuild. The scan taken before the build becomes
//! the new baseline, so edits saved while the build runs show up on the
//! following tick.

use crate::error::{DapperError, Result};
use crate::types::BuildReport;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    modified: Option<SystemTime>,
    len: u64,
}

impl Signature {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(PathBuf),
    Removed(PathBuf),
    Modified(PathBuf),
}

impl Change {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(path) | Self::Removed(path) | Self::Modified(path) => path,
        }
    }
}

/// Last-seen signature of every watched file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    files: BTreeMap<PathBuf, Signature>,
}

impl WatchState {
    /// Records every file reachable from `paths`. Missing paths are skipped;
    /// creating them later shows up as added files.
    pub fn scan(paths: &[PathBuf]) -> Self {
        let mut files = BTreeMap::new();

        for root in paths {
            for entry in WalkDir::new(root).into_iter().filter_map(|entry| entry.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(signature) = Signature::of(entry.path()) {
                    files.insert(entry.path().to_path_buf(), signature);
                }
            }
        }

        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn changes(&self, newer: &WatchState) -> Vec<Change> {
        let mut changes = Vec::new();

        for (path, signature) in &newer.files {
            match self.files.get(path) {
                None => changes.push(Change::Added(path.clone())),
                Some(previous) if previous != signature => {
                    changes.push(Change::Modified(path.clone()))
                }
                Some(_) => {}
            }
        }

        for path in self.files.keys() {
            if !newer.files.contains_key(path) {
                changes.push(Change::Removed(path.clone()));
            }
        }

        changes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Rebuilding,
}

#[derive(Debug)]
pub enum PollOutcome {
    Unchanged,
    Rebuilt(BuildReport),
    Failed(DapperError),
}

type PathRefresh = Box<dyn FnMut() -> Option<Vec<PathBuf>> + Send>;

pub struct Watcher<F> {
    paths: Vec<PathBuf>,
    interval: Duration,
    state: WatchState,
    phase: WatchPhase,
    initialized: bool,
    rebuild: F,
    refresh: Option<PathRefresh>,
}

impl<F> Watcher<F>
where
    F: FnMut() -> Result<BuildReport>,
{
    pub fn new(paths: Vec<PathBuf>, rebuild: F) -> Self {
        Self {
            paths,
            interval: DEFAULT_POLL_INTERVAL,
            state: WatchState::default(),
            phase: WatchPhase::Idle,
            initialized: false,
            rebuild,
            refresh: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Asks `refresh` for the watched paths after every rebuild, so a config
    /// edit that moves the source or layout directory is followed. `None`
    /// keeps the current paths.
    pub fn refresh_paths(
        mut self,
        refresh: impl FnMut() -> Option<Vec<PathBuf>> + Send + 'static,
    ) -> Self {
        self.refresh = Some(Box::new(refresh));
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Baseline scan. Never triggers a build.
    pub fn init(&mut self) {
        self.state = WatchState::scan(&self.paths);
        self.initialized = true;
        tracing::debug!(files = self.state.len(), "watch baseline recorded");
    }

    /// One tick: rescan, and rebuild once if anything differs.
    pub fn poll(&mut self) -> PollOutcome {
        if !self.initialized {
            self.init();
            return PollOutcome::Unchanged;
        }

        let current = WatchState::scan(&self.paths);
        let changes = self.state.changes(&current);
        if changes.is_empty() {
            return PollOutcome::Unchanged;
        }

        tracing::info!(
            changed = changes.len(),
            first = %changes[0].path().display(),
            "changes detected, rebuilding"
        );

        self.phase = WatchPhase::Rebuilding;
        let result = (self.rebuild)();
        self.state = current;
        self.follow_moved_paths();
        self.phase = WatchPhase::Idle;

        match result {
            Ok(report) => {
                tracing::debug!("rebuilt: {report}");
                PollOutcome::Rebuilt(report)
            }
            Err(error) => {
                tracing::error!(%error, "rebuild failed");
                PollOutcome::Failed(error)
            }
        }
    }

    fn follow_moved_paths(&mut self) {
        let Some(refresh) = self.refresh.as_mut() else {
            return;
        };
        let Some(paths) = refresh() else {
            return;
        };
        if paths == self.paths {
            return;
        }

        tracing::info!(paths = ?paths, "watched paths changed");
        self.paths = paths;
        // The build just ran against the new directories.
        self.state = WatchState::scan(&self.paths);
    }

    /// Polls until `stop` receives a message or its sender is dropped.
    /// `on_rebuild` runs after every rebuild that produced a report.
    pub fn run(&mut self, stop: &Receiver<()>, mut on_rebuild: impl FnMut(&BuildReport)) {
        if !self.initialized {
            self.init();
        }

        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let PollOutcome::Rebuilt(report) = self.poll() {
                        on_rebuild(&report);
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::debug!("watcher stopped");
    }
}
