//! Change notification for the live log.
//!
//! The parent directory is watched rather than the file itself so rotation
//! (delete + recreate) keeps producing events. A poll interval bounds every
//! wait, which covers filesystems where notifications never arrive.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::core::errors::{PwError, Result};

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchSignal {
    /// The watched file was reported as modified.
    Changed,
    /// The poll interval elapsed without a report.
    Timeout,
}

/// Blocks until the watched file may have new content.
pub trait ChangeNotifier {
    fn wait(&mut self) -> Result<WatchSignal>;
}

/// `notify`-backed notifier for one file.
pub struct FsChangeNotifier {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    dir: PathBuf,
    file_name: OsString,
    poll_interval: Duration,
}

impl FsChangeNotifier {
    pub fn watch(path: &Path, poll_interval: Duration) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| PwError::Watch {
                path: path.to_path_buf(),
                details: "path has no file name".to_string(),
            })?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|err| PwError::Watch {
                path: dir.clone(),
                details: err.to_string(),
            })?;

        Ok(Self {
            _watcher: watcher,
            rx,
            dir,
            file_name,
            poll_interval,
        })
    }

    fn concerns_file(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.is_empty()
            || event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    /// A backend error means changes may already have been lost, so it is
    /// fatal rather than a missed tick.
    fn classify(&self, res: notify::Result<Event>) -> Result<bool> {
        match res {
            Ok(event) => Ok(self.concerns_file(&event)),
            Err(err) => Err(PwError::Watch {
                path: self.dir.clone(),
                details: err.to_string(),
            }),
        }
    }
}

impl ChangeNotifier for FsChangeNotifier {
    fn wait(&mut self) -> Result<WatchSignal> {
        let mut changed = match self.rx.recv_timeout(self.poll_interval) {
            Ok(res) => self.classify(res)?,
            Err(RecvTimeoutError::Timeout) => return Ok(WatchSignal::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PwError::Watch {
                    path: self.dir.clone(),
                    details: "watcher stopped delivering events".to_string(),
                });
            }
        };

        // Coalesce a burst of writes into one read pass.
        while let Ok(res) = self.rx.try_recv() {
            changed |= self.classify(res)?;
        }

        // Unrelated directory activity still counts as a poll tick.
        Ok(if changed {
            WatchSignal::Changed
        } else {
            WatchSignal::Timeout
        })
    }
}
