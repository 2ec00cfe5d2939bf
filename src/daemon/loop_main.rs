//! Daemon supervisor: wires the pipeline together and waits for it to end.
//!
//! Architecture: one process, four worker threads plus the supervisor:
//! - **Tailer thread**: replays archives, then follows the live log
//! - **Tracker thread**: sole writer of the presence table
//! - **Feed thread**: serves the rendered presence over HTTP
//! - **Logger thread**: writes the JSONL activity log
//!
//! The supervisor (the calling thread) blocks on the fatal-error channel with
//! a short timeout and polls the shutdown flag in between. Either a fatal
//! tailer error or SIGTERM/SIGINT leads to the same ordered shutdown.

#![allow(missing_docs)]

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

use crate::core::config::Config;
use crate::core::errors::{PwError, Result};
use crate::daemon::signals::{ShutdownCoordinator, SignalHandler};
use crate::feed::server::{FeedServer, spawn_feed_server};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::presence::table::PresenceEvent;
use crate::presence::tracker::{PresenceTracker, PresenceView, TrackerStats, spawn_tracker};
use crate::tail::extract::EventExtractor;
use crate::tail::tailer::{LogTailer, TailStats, spawn_tailer};

/// How long the supervisor waits on the error channel between flag checks.
const SUPERVISOR_TICK: Duration = Duration::from_millis(200);

/// Only the first fatal error matters; the tailer stops after sending it.
const ERROR_CHANNEL_CAP: usize = 1;

// ──────────────────── daemon configuration ────────────────────

/// Arguments for `pwatch run` that are not part of the config file.
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    /// Register SIGTERM/SIGINT hooks. Off in tests that drive shutdown by hand.
    pub handle_signals: bool,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            handle_signals: true,
        }
    }
}

/// What the worker threads reported on the way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonReport {
    pub tail: TailStats,
    pub tracker: TrackerStats,
    pub feed_requests: u64,
    pub uptime_secs: u64,
}

/// Workers built by `init` and started by `run`.
struct Pending {
    tailer: LogTailer,
    tracker: PresenceTracker,
    feed: Option<FeedServer>,
}

/// The presence daemon: owns every playerwatch thread.
pub struct PresenceDaemon {
    config: Config,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    view: PresenceView,
    feed_addr: Option<SocketAddr>,
    pending: Option<Pending>,
    start_time: Instant,
}

impl PresenceDaemon {
    /// Build the daemon from configuration. Binds the feed listener so address
    /// conflicts surface before anything starts running.
    pub fn init(config: Config, args: &DaemonArgs) -> Result<Self> {
        let start_time = Instant::now();

        // 1. Logger.
        let (logger_handle, logger_join) = spawn_logger(JsonlConfig {
            path: config.paths.activity_log.clone(),
            ..JsonlConfig::default()
        })?;

        // 2. Signal handler.
        let signal_handler = if args.handle_signals {
            SignalHandler::new()
        } else {
            SignalHandler::detached()
        };

        // 3. Extraction and tracking.
        let extractor = EventExtractor::with_local_zone()?;
        let tracker = PresenceTracker::new(&config.presence, logger_handle.clone());
        let view = tracker.view();
        let tailer = LogTailer::new(config.tail.clone(), extractor, logger_handle.clone());

        // 4. Feed listener.
        let (feed, feed_addr) = if config.feed.enabled {
            let server = FeedServer::bind(&config.feed, config.feed_addr()?, view.clone())?;
            let addr = server.local_addr()?;
            (Some(server), Some(addr))
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            view,
            feed_addr,
            pending: Some(Pending {
                tailer,
                tracker,
                feed,
            }),
            start_time,
        })
    }

    pub fn view(&self) -> PresenceView {
        self.view.clone()
    }

    /// Bound feed address, when the feed is enabled.
    pub fn feed_addr(&self) -> Option<SocketAddr> {
        self.feed_addr
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    /// Run until shutdown is requested or the tailer reports a fatal error.
    ///
    /// This is the main entry point for `pwatch run`.
    pub fn run(&mut self) -> Result<DaemonReport> {
        let Pending {
            tailer,
            tracker,
            feed,
        } = self.pending.take().ok_or_else(|| PwError::Runtime {
            details: "daemon already ran".to_string(),
        })?;

        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
        });
        eprintln!(
            "[PW-DAEMON] following {} (feed: {})",
            self.config.tail.live_path().display(),
            self.feed_addr
                .map_or_else(|| "disabled".to_string(), |a| format!("http://{a}{}", self.config.feed.path))
        );

        // Channels: tailer → tracker is bounded for back-pressure; the error
        // channel carries at most one fatal error.
        let (event_tx, event_rx) =
            bounded::<PresenceEvent>(self.config.tail.event_channel_capacity);
        let (error_tx, error_rx) = bounded::<PwError>(ERROR_CHANNEL_CAP);

        let stop = self.signal_handler.flag();
        let tracker_join = spawn_tracker(tracker, event_rx)?;
        let feed_join = feed
            .map(|server| spawn_feed_server(server, stop.clone()))
            .transpose()?;
        let tailer_join = spawn_tailer(tailer, event_tx, error_tx, stop)?;

        let outcome = self.supervise(&error_rx);
        let reason = match &outcome {
            Ok(()) => "clean shutdown".to_string(),
            Err(err) => format!("fatal error {}", err.code()),
        };
        let report = self.shutdown(&reason, tailer_join, tracker_join, feed_join);

        match outcome {
            Ok(()) => Ok(report),
            Err(err) => {
                eprintln!("[PW-DAEMON] fatal: {err}");
                Err(err)
            }
        }
    }

    fn supervise(&self, errors: &Receiver<PwError>) -> Result<()> {
        loop {
            if self.signal_handler.should_shutdown() {
                eprintln!("[PW-DAEMON] shutdown requested");
                return Ok(());
            }
            match errors.recv_timeout(SUPERVISOR_TICK) {
                Ok(err) => return Err(err),
                Err(RecvTimeoutError::Timeout) => {}
                // The tailer left without an error: its downstream is gone.
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    // ──────────────────── shutdown ────────────────────

    fn shutdown(
        &mut self,
        reason: &str,
        tailer_join: thread::JoinHandle<TailStats>,
        tracker_join: thread::JoinHandle<TrackerStats>,
        feed_join: Option<thread::JoinHandle<u64>>,
    ) -> DaemonReport {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let mut report = DaemonReport {
            uptime_secs,
            ..DaemonReport::default()
        };

        // 1. Raise the flag; the tailer sees it at its next wake-up and drops
        //    the event sender, which in turn ends the tracker.
        self.signal_handler.request_shutdown();

        {
            let mut tailer_join = Some(tailer_join);
            let mut tracker_join = Some(tracker_join);
            let mut feed_join = feed_join;

            let mut stop_tailer = || {
                tailer_join
                    .take()
                    .is_none_or(|h| h.join().map(|s| report.tail = s).is_ok())
            };
            let mut drain_tracker = || {
                tracker_join
                    .take()
                    .is_none_or(|h| h.join().map(|s| report.tracker = s).is_ok())
            };
            let mut stop_feed = || {
                feed_join
                    .take()
                    .is_none_or(|h| h.join().map(|n| report.feed_requests = n).is_ok())
            };

            let mut tasks: Vec<(&str, &mut dyn FnMut() -> bool)> = vec![
                ("stop tailer", &mut stop_tailer),
                ("drain tracker", &mut drain_tracker),
                ("stop feed", &mut stop_feed),
            ];
            ShutdownCoordinator::new().execute(&mut tasks);
        }

        // 2. Log shutdown.
        self.logger_handle.send(ActivityEvent::DaemonStopped {
            reason: reason.to_string(),
            uptime_secs,
        });

        // 3. Shutdown logger thread.
        self.logger_handle.shutdown();
        if let Some(logger_join) = self.logger_join.take() {
            let _ = logger_join.join();
        }

        eprintln!(
            "[PW-DAEMON] shutdown complete (uptime={uptime_secs}s, lines={}, events={}, stale={})",
            report.tail.lines, report.tail.events, report.tracker.stale
        );
        report
    }
}

// ──────────────────── tests ────────────────────
