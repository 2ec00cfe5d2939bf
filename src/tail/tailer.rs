//! Log tailer: archives once, oldest first, then the live file on every change.
//!
//! Events go out on a bounded, ordered channel; the send blocks while the
//! tracker is behind, which is the only back-pressure in the pipeline. A fatal
//! source error is reported once on the error channel and ends the thread.

#![allow(missing_docs)]

use std::cmp::Ordering as CmpOrdering;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use crossbeam_channel::Sender;

use crate::core::config::TailConfig;
use crate::core::errors::{PwError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::presence::table::PresenceEvent;
use crate::tail::cursor::LogCursor;
use crate::tail::extract::EventExtractor;
use crate::tail::source::{LineOrigin, LogSource, SourceKind, embedded_date};
use crate::tail::watch::{ChangeNotifier, FsChangeNotifier};

/// Counters reported when the tailer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    pub archives: u64,
    pub lines: u64,
    pub events: u64,
    pub truncation_resets: u64,
}

/// An archive and the key it is replayed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub source: LogSource,
    pub date: NaiveDate,
    pub rotation: u32,
}

impl Archive {
    fn name(&self) -> String {
        self.source
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn replay_order(&self, other: &Self) -> CmpOrdering {
        self.date
            .cmp(&other.date)
            .then(self.rotation.cmp(&other.rotation))
            .then_with(|| self.name().cmp(&other.name()))
    }
}

/// Whether a live pass ran to completion or the downstream went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    ReceiverGone,
}

pub struct LogTailer {
    config: TailConfig,
    extractor: EventExtractor,
    live: LogSource,
    cursor: LogCursor,
    logger: ActivityLoggerHandle,
    stats: TailStats,
    live_seen: bool,
    live_missing: bool,
}

impl LogTailer {
    pub fn new(config: TailConfig, extractor: EventExtractor, logger: ActivityLoggerHandle) -> Self {
        let live_path = config.live_path();
        Self {
            live: LogSource::plain(&live_path),
            cursor: LogCursor::new(live_path),
            config,
            extractor,
            logger,
            stats: TailStats::default(),
            live_seen: false,
            live_missing: false,
        }
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    pub fn live_path(&self) -> &Path {
        self.live.path()
    }

    /// Compressed archives in the log directory, in replay order.
    pub fn archives(&self) -> Result<Vec<Archive>> {
        let dir = &self.config.log_dir;
        let entries = fs::read_dir(dir).map_err(|source| PwError::io(dir, source))?;
        let zone = self.extractor.zone();

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PwError::io(dir, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let source = LogSource::classify(&path, &self.config.archive_suffix);
            if source.kind() != SourceKind::Compressed {
                continue;
            }
            let rotation = path
                .file_name()
                .and_then(|n| embedded_date(&n.to_string_lossy()))
                .map_or(0, |(_, index)| index);
            let date = source.log_date(&zone)?;
            archives.push(Archive {
                source,
                date,
                rotation,
            });
        }
        archives.sort_by(Archive::replay_order);
        Ok(archives)
    }

    /// Emit every event from every archive, oldest archive first.
    pub fn replay_archives(&mut self, events: &Sender<PresenceEvent>) -> Result<()> {
        for archive in self.archives()? {
            let mut emitted = 0_u64;
            let mut gone = false;
            let extractor = &self.extractor;
            let pass = archive.source.read_all_lines(|line| {
                let Some(event) = extractor.extract(line, archive.date) else {
                    return ControlFlow::Continue(());
                };
                if events.send(event).is_err() {
                    gone = true;
                    return ControlFlow::Break(());
                }
                emitted += 1;
                ControlFlow::Continue(())
            })?;

            self.stats.archives += 1;
            self.stats.lines += pass.lines;
            self.stats.events += emitted;
            self.logger.send(ActivityEvent::ArchiveLoaded {
                path: archive.source.path().display().to_string(),
                events: emitted,
            });
            if gone {
                break;
            }
        }
        Ok(())
    }

    /// One offset-resumed pass over the live file.
    fn read_live(&mut self, events: &Sender<PresenceEvent>) -> Result<Flow> {
        let log_date = self.live.log_date(&self.extractor.zone())?;
        let extractor = &self.extractor;
        let mut emitted = 0_u64;
        let mut flow = Flow::Continue;

        let pass = match self.live.read_new_lines(&mut self.cursor, |line, origin| {
            let Some(mut event) = extractor.extract(line, log_date) else {
                return ControlFlow::Continue(());
            };
            if origin == LineOrigin::Reread {
                event = event.into_reread();
            }
            if events.send(event).is_err() {
                flow = Flow::ReceiverGone;
                return ControlFlow::Break(());
            }
            emitted += 1;
            ControlFlow::Continue(())
        }) {
            Ok(pass) => pass,
            Err(PwError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                if !self.live_seen {
                    return Err(PwError::MissingLiveLog {
                        path: self.live.path().to_path_buf(),
                    });
                }
                if !self.live_missing {
                    self.live_missing = true;
                    eprintln!(
                        "[PW-TAIL] live log {} is missing, waiting for it to reappear",
                        self.live.path().display()
                    );
                    self.logger.send(ActivityEvent::LiveLogMissing {
                        path: self.live.path().display().to_string(),
                        offset: self.cursor.offset(),
                    });
                }
                return Ok(Flow::Continue);
            }
            Err(err) => return Err(err),
        };

        self.live_seen = true;
        self.live_missing = false;
        self.stats.lines += pass.lines;
        self.stats.events += emitted;
        if let Some(previous) = pass.truncated_from {
            self.stats.truncation_resets += 1;
            self.logger.send(ActivityEvent::TruncationReset {
                path: self.live.path().display().to_string(),
                previous_offset: previous,
                size: pass.observed_len,
            });
        }
        Ok(flow)
    }

    /// Archives plus a single live pass, without watching.
    pub fn backfill(&mut self, events: &Sender<PresenceEvent>) -> Result<TailStats> {
        self.replay_archives(events)?;
        self.read_live(events)?;
        Ok(self.stats)
    }

    /// Backfill, then follow the live file until `stop` is raised or the
    /// receiver is dropped. `connect` builds the notifier once archives are done.
    pub fn run_with<N, F>(
        &mut self,
        events: &Sender<PresenceEvent>,
        connect: F,
        stop: &AtomicBool,
    ) -> Result<TailStats>
    where
        N: ChangeNotifier,
        F: FnOnce(&Path) -> Result<N>,
    {
        self.replay_archives(events)?;
        let mut notifier = connect(self.live.path())?;

        while !stop.load(Ordering::Relaxed) {
            if self.read_live(events)? == Flow::ReceiverGone {
                break;
            }
            notifier.wait()?;
        }
        Ok(self.stats)
    }

    /// Follow the live file using filesystem notifications.
    pub fn run(&mut self, events: &Sender<PresenceEvent>, stop: &AtomicBool) -> Result<TailStats> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        self.run_with(events, |path| FsChangeNotifier::watch(path, poll), stop)
    }
}

/// Move the tailer onto its own thread. A fatal error is logged, sent on
/// `errors`, and ends the thread.
pub fn spawn_tailer(
    mut tailer: LogTailer,
    events: Sender<PresenceEvent>,
    errors: Sender<PwError>,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<TailStats>> {
    thread::Builder::new()
        .name("pw-tailer".to_string())
        .spawn(move || match tailer.run(&events, &stop) {
            Ok(stats) => stats,
            Err(err) => {
                tailer.logger.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                let _ = errors.send(err);
                tailer.stats()
            }
        })
        .map_err(|e| PwError::Runtime {
            details: format!("failed to spawn tailer thread: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::activity::spawn_logger;
    use crate::logger::jsonl::JsonlConfig;
    use crate::presence::table::EventKind;
    use crate::tail::watch::WatchSignal;
    use std::path::PathBuf;
    use chrono::FixedOffset;
    use crossbeam_channel::{bounded, unbounded};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::Write;

    const JOIN: &str = "[Server thread/INFO]: {u}[/10.0.0.1:5000] logged in with entity id 7";
    const PART: &str = "[Server thread/INFO]: {u} lost connection: Disconnected";

    fn join(t: &str, u: &str) -> String {
        format!("[{t}] {}\n", JOIN.replace("{u}", u))
    }

    fn part(t: &str, u: &str) -> String {
        format!("[{t}] {}\n", PART.replace("{u}", u))
    }

    fn write_gz(path: &Path, body: &str) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    fn tailer(dir: &Path) -> LogTailer {
        let config = TailConfig {
            log_dir: dir.to_path_buf(),
            ..TailConfig::default()
        };
        let extractor = EventExtractor::new(FixedOffset::east_opt(0).unwrap()).unwrap();
        LogTailer::new(config, extractor, ActivityLoggerHandle::noop())
    }

    /// Replays scripted file changes, one per wait.
    struct Script {
        steps: VecDeque<Box<dyn FnOnce()>>,
        stop: Arc<AtomicBool>,
    }

    impl ChangeNotifier for Script {
        fn wait(&mut self) -> Result<WatchSignal> {
            match self.steps.pop_front() {
                Some(step) => {
                    step();
                    Ok(WatchSignal::Changed)
                }
                None => {
                    self.stop.store(true, Ordering::Relaxed);
                    Ok(WatchSignal::Timeout)
                }
            }
        }
    }

    #[test]
    fn archives_sort_by_date_then_rotation() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "2014-03-02-2.log.gz",
            "2014-03-01-1.log.gz",
            "2014-03-02-10.log.gz",
            "2014-03-02-1.log.gz",
        ] {
            write_gz(&dir.path().join(name), "");
        }
        fs::write(dir.path().join("latest.log"), "").unwrap();

        let names: Vec<String> = tailer(dir.path())
            .archives()
            .unwrap()
            .iter()
            .map(Archive::name)
            .collect();
        assert_eq!(
            names,
            vec![
                "2014-03-01-1.log.gz",
                "2014-03-02-1.log.gz",
                "2014-03-02-2.log.gz",
                "2014-03-02-10.log.gz",
            ]
        );
    }

    #[test]
    fn backfill_emits_archives_before_live() {
        let dir = tempfile::tempdir().unwrap();
        write_gz(
            &dir.path().join("2014-03-01-1.log.gz"),
            &(join("10:00:00", "alex") + &part("11:00:00", "alex")),
        );
        write_gz(
            &dir.path().join("2014-03-02-1.log.gz"),
            &join("09:00:00", "steve"),
        );
        fs::write(dir.path().join("latest.log"), part("08:00:00", "steve")).unwrap();

        let (tx, rx) = unbounded();
        let mut t = tailer(dir.path());
        let stats = t.backfill(&tx).unwrap();
        drop(tx);

        let got: Vec<(String, EventKind, String)> = rx
            .iter()
            .map(|e| {
                (
                    e.username,
                    e.kind,
                    e.timestamp.naive_local().date().to_string(),
                )
            })
            .collect();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].0, "alex");
        assert_eq!(got[0].2, "2014-03-01");
        assert_eq!(got[2], ("steve".into(), EventKind::Login, "2014-03-02".into()));
        assert_eq!(got[3].1, EventKind::Logout);
        assert_eq!(stats.archives, 2);
        assert_eq!(stats.events, 4);
    }

    #[test]
    fn missing_live_log_is_fatal_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded();
        let err = tailer(dir.path()).backfill(&tx).expect_err("no live log");
        assert_eq!(err.code(), "PW-2004");
    }

    #[test]
    fn corrupt_archive_aborts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2014-03-01-1.log.gz"), b"nope").unwrap();
        fs::write(dir.path().join("latest.log"), "").unwrap();
        let (tx, _rx) = unbounded();
        let err = tailer(dir.path()).backfill(&tx).expect_err("corrupt");
        assert_eq!(err.code(), "PW-2002");
    }

    #[test]
    fn live_appends_and_truncation_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("latest.log");
        fs::write(&live, join("12:00:00", "steve")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let append_path = live.clone();
        let trunc_path = live.clone();
        let script = Script {
            steps: VecDeque::from(vec![
                Box::new(move || {
                    fs::OpenOptions::new()
                        .append(true)
                        .open(&append_path)
                        .unwrap()
                        .write_all(join("12:05:00", "alex").as_bytes())
                        .unwrap();
                }) as Box<dyn FnOnce()>,
                Box::new(move || fs::write(&trunc_path, part("13:00:00", "steve")).unwrap()),
            ]),
            stop: Arc::clone(&stop),
        };

        let (tx, rx) = unbounded();
        let mut t = tailer(dir.path());
        let stats = t.run_with(&tx, |_| Ok(script), &stop).unwrap();
        drop(tx);

        let users: Vec<(String, EventKind, bool)> =
            rx.iter().map(|e| (e.username, e.kind, e.reread)).collect();
        assert_eq!(
            users,
            vec![
                ("steve".to_string(), EventKind::Login, false),
                ("alex".to_string(), EventKind::Login, false),
                ("steve".to_string(), EventKind::Logout, true),
            ]
        );
        assert_eq!(stats.truncation_resets, 1);
    }

    #[test]
    fn dropped_receiver_stops_quietly() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("latest.log"),
            join("12:00:00", "steve") + &join("12:01:00", "alex"),
        )
        .unwrap();

        let (tx, rx) = bounded(1);
        drop(rx);
        let stop = AtomicBool::new(false);
        let script = Script {
            steps: VecDeque::new(),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let stats = tailer(dir.path())
            .run_with(&tx, |_| Ok(script), &stop)
            .expect("clean exit");
        assert_eq!(stats.events, 0);
    }

    #[test]
    fn vanished_live_log_is_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("latest.log");
        fs::write(&live, join("12:00:00", "steve")).unwrap();

        let activity = dir.path().join("activity.jsonl");
        let (logger, logger_join) = spawn_logger(JsonlConfig {
            path: activity.clone(),
            ..JsonlConfig::default()
        })
        .unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let gone = live.clone();
        let script = Script {
            steps: VecDeque::from(vec![
                Box::new(move || fs::remove_file(&gone).unwrap()) as Box<dyn FnOnce()>,
                Box::new(|| {}),
            ]),
            stop: Arc::clone(&stop),
        };

        let config = TailConfig {
            log_dir: dir.path().to_path_buf(),
            ..TailConfig::default()
        };
        let extractor = EventExtractor::new(FixedOffset::east_opt(0).unwrap()).unwrap();
        let mut t = LogTailer::new(config, extractor, logger.clone());
        let (tx, _rx) = unbounded();
        t.run_with(&tx, |_| Ok(script), &stop).expect("missing file is not fatal");

        logger.shutdown();
        logger_join.join().unwrap();
        let missing: Vec<serde_json::Value> = fs::read_to_string(&activity)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
            .filter(|v| v["event"] == "live_log_missing")
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0]["offset"], join("12:00:00", "steve").len());
    }

    /// Fails on the first wait, like a watcher whose backend overflowed.
    struct BrokenWatch;

    impl ChangeNotifier for BrokenWatch {
        fn wait(&mut self) -> Result<WatchSignal> {
            Err(PwError::Watch {
                path: PathBuf::from("logs"),
                details: "inotify queue overflow".to_string(),
            })
        }
    }

    #[test]
    fn watch_failure_ends_tailing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("latest.log"), join("12:00:00", "steve")).unwrap();

        let (tx, rx) = unbounded();
        let stop = AtomicBool::new(false);
        let err = tailer(dir.path())
            .run_with(&tx, |_| Ok(BrokenWatch), &stop)
            .expect_err("watch failure is fatal");
        assert_eq!(err.code(), "PW-2003");
        assert_eq!(rx.try_iter().count(), 1, "lines before the failure still go out");
    }

    #[test]
    fn spawned_tailer_reports_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded();
        let (etx, erx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let join = spawn_tailer(tailer(dir.path()), tx, etx, stop).unwrap();
        join.join().unwrap();
        let err = erx.recv().expect("fatal error delivered");
        assert_eq!(err.code(), "PW-2004");
    }
}
