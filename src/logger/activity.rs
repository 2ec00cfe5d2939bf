//! Activity logger thread.
//!
//! A dedicated thread owns the `JsonlWriter`. The tailer, tracker and daemon
//! send `ActivityEvent`s through a bounded crossbeam channel; `try_send()`
//! keeps presence tracking from ever blocking on logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{PwError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::presence::table::Timestamp;

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events that can be logged through the activity logger.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    ArchiveLoaded {
        path: String,
        events: u64,
    },
    PlayerJoined {
        player: String,
        at: Timestamp,
    },
    PlayerLeft {
        player: String,
        at: Timestamp,
    },
    StaleEventSkipped {
        player: String,
        at: Timestamp,
    },
    TruncationReset {
        path: String,
        previous_offset: u64,
        size: u64,
    },
    /// The live log vanished after it had been read; tailing waits for it.
    LiveLogMissing {
        path: String,
        offset: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events go nowhere (one-shot commands and tests).
    pub fn noop() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and counted.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Spawn the logger thread and return a handle.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("pw-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped_clone))
        .map_err(|e| PwError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));

        // Keep the file current for anyone tailing it while the channel is idle.
        if rx.is_empty() {
            jsonl.flush();
        }
    }

    jsonl.flush();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e
        }
        ActivityEvent::ArchiveLoaded { path, events } => {
            let mut e = LogEntry::new(EventType::ArchiveLoaded, Severity::Info);
            e.path = Some(path.clone());
            e.events = Some(*events);
            e
        }
        ActivityEvent::PlayerJoined { player, at } => {
            player_entry(EventType::PlayerJoined, Severity::Info, player, at)
        }
        ActivityEvent::PlayerLeft { player, at } => {
            player_entry(EventType::PlayerLeft, Severity::Info, player, at)
        }
        ActivityEvent::StaleEventSkipped { player, at } => {
            player_entry(EventType::StaleEventSkipped, Severity::Warning, player, at)
        }
        ActivityEvent::TruncationReset {
            path,
            previous_offset,
            size,
        } => {
            let mut e = LogEntry::new(EventType::TruncationReset, Severity::Warning);
            e.path = Some(path.clone());
            e.offset = Some(*previous_offset);
            e.details = Some(format!("file shrank to {size} bytes, re-reading from start"));
            e
        }
        ActivityEvent::LiveLogMissing { path, offset } => {
            let mut e = LogEntry::new(EventType::LiveLogMissing, Severity::Warning);
            e.path = Some(path.clone());
            e.offset = Some(*offset);
            e.details = Some("live log missing, waiting for rotation to finish".to_string());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.details = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some("logger shutdown".to_string());
            e
        }
    }
}

fn player_entry(kind: EventType, severity: Severity, player: &str, at: &Timestamp) -> LogEntry {
    let mut e = LogEntry::new(kind, severity);
    e.player = Some(player.to_string());
    e.at = Some(at.to_rfc3339());
    e
}
