//! Presence tracker: the single writer of the presence table.
//!
//! The tracker drains the ordered event channel on its own thread and applies
//! each event in arrival order. Everyone else reads through a [`PresenceView`],
//! which only ever takes the read side of the lock.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::RwLock;

use crate::core::config::PresenceConfig;
use crate::core::errors::{PwError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::presence::render::render;
use crate::presence::table::{EventKind, PresenceEvent, PresenceTable, Transition};

/// Read-only, cloneable access to the presence table.
#[derive(Clone)]
pub struct PresenceView {
    table: Arc<RwLock<PresenceTable>>,
}

impl PresenceView {
    /// Copy of the table as of now.
    pub fn snapshot(&self) -> PresenceTable {
        self.table.read().clone()
    }

    /// Display string as seen at `now`.
    pub fn render_at(&self, now: DateTime<Utc>) -> String {
        render(&self.table.read(), now)
    }

    /// Display string as seen at the current wall-clock time.
    pub fn render(&self) -> String {
        self.render_at(Utc::now())
    }

    pub fn online_count(&self) -> usize {
        self.table.read().online().len()
    }
}

/// Counters reported when the tracker thread exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub applied: u64,
    pub stale: u64,
}

/// Owner of the presence table.
pub struct PresenceTracker {
    table: Arc<RwLock<PresenceTable>>,
    ignore_stale: bool,
    logger: ActivityLoggerHandle,
    stats: TrackerStats,
}

impl PresenceTracker {
    pub fn new(config: &PresenceConfig, logger: ActivityLoggerHandle) -> Self {
        Self {
            table: Arc::new(RwLock::new(PresenceTable::new())),
            ignore_stale: config.ignore_stale_events,
            logger,
            stats: TrackerStats::default(),
        }
    }

    pub fn view(&self) -> PresenceView {
        PresenceView {
            table: Arc::clone(&self.table),
        }
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Apply one event to the table.
    ///
    /// Every fresh event overwrites the user's record. With the stale guard
    /// on, an event re-read after a truncation reset is dropped when it is
    /// older than the record it would replace.
    pub fn apply(&mut self, event: &PresenceEvent) -> Transition {
        let transition = {
            let mut table = self.table.write();
            if self.ignore_stale && event.reread && table.is_stale(event) {
                Transition::Stale
            } else {
                table.apply(event)
            }
        };

        match transition {
            Transition::Stale => {
                self.stats.stale += 1;
                self.logger.send(ActivityEvent::StaleEventSkipped {
                    player: event.username.clone(),
                    at: event.timestamp,
                });
            }
            Transition::Applied { kind, .. } => {
                self.stats.applied += 1;
                let player = event.username.clone();
                let at = event.timestamp;
                self.logger.send(match kind {
                    EventKind::Login => ActivityEvent::PlayerJoined { player, at },
                    EventKind::Logout => ActivityEvent::PlayerLeft { player, at },
                });
            }
        }

        transition
    }

    /// Consume events until every sender has been dropped.
    pub fn run(&mut self, events: &Receiver<PresenceEvent>) -> TrackerStats {
        for event in events {
            self.apply(&event);
        }
        self.stats
    }
}

/// Move the tracker onto its own thread.
pub fn spawn_tracker(
    mut tracker: PresenceTracker,
    events: Receiver<PresenceEvent>,
) -> Result<thread::JoinHandle<TrackerStats>> {
    thread::Builder::new()
        .name("pw-tracker".to_string())
        .spawn(move || tracker.run(&events))
        .map_err(|e| PwError::Runtime {
            details: format!("failed to spawn tracker thread: {e}"),
        })
}
