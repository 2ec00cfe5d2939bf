//! Presence data model: events, per-user records, and the online/offline table.
//!
//! The table is a two-state machine per username. A user is *absent* (no
//! record), *online* (record in `online`, `since` = login time) or *last seen*
//! (record in `offline`, `since` = logout time). Every transition removes the
//! user from the opposite map before inserting, so no username is ever held in
//! both maps.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Instant attached to presence events, carrying the zone offset that was
/// applied when the log line was parsed.
pub type Timestamp = DateTime<FixedOffset>;

/// Login or logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Login,
    Logout,
}

/// One login/logout occurrence extracted from a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEvent {
    pub username: String,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    /// Read from bytes already consumed once, before a truncation reset.
    #[serde(skip)]
    pub reread: bool,
}

impl PresenceEvent {
    #[must_use]
    pub fn login(username: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            username: username.into(),
            kind: EventKind::Login,
            timestamp,
            reread: false,
        }
    }

    #[must_use]
    pub fn logout(username: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            username: username.into(),
            kind: EventKind::Logout,
            timestamp,
            reread: false,
        }
    }

    /// Mark the event as coming from a re-read after truncation.
    #[must_use]
    pub fn into_reread(mut self) -> Self {
        self.reread = true;
        self
    }
}

/// A user and the instant of their last transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub since: Timestamp,
}

/// Where a user stood before an event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Absent,
    Online,
    LastSeen,
}

/// Outcome of feeding one event to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The event was applied; `from` is the user's state beforehand.
    Applied { kind: EventKind, from: PresenceState },
    /// A re-read event older than the user's current record; skipped.
    Stale,
}

/// Online and offline mappings, keyed and ordered by username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PresenceTable {
    online: BTreeMap<String, UserRecord>,
    offline: BTreeMap<String, UserRecord>,
}

impl PresenceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn online(&self) -> &BTreeMap<String, UserRecord> {
        &self.online
    }

    pub fn offline(&self) -> &BTreeMap<String, UserRecord> {
        &self.offline
    }

    pub fn state_of(&self, username: &str) -> PresenceState {
        if self.online.contains_key(username) {
            PresenceState::Online
        } else if self.offline.contains_key(username) {
            PresenceState::LastSeen
        } else {
            PresenceState::Absent
        }
    }

    /// The user's current record, from whichever map holds it.
    pub fn record(&self, username: &str) -> Option<&UserRecord> {
        self.online
            .get(username)
            .or_else(|| self.offline.get(username))
    }

    /// True when `event` is strictly older than the user's current record.
    pub fn is_stale(&self, event: &PresenceEvent) -> bool {
        self.record(&event.username)
            .is_some_and(|record| event.timestamp < record.since)
    }

    /// Apply one event unconditionally.
    pub fn apply(&mut self, event: &PresenceEvent) -> Transition {
        let from = self.state_of(&event.username);
        let record = UserRecord {
            username: event.username.clone(),
            since: event.timestamp,
        };

        match event.kind {
            EventKind::Login => {
                self.offline.remove(&event.username);
                self.online.insert(event.username.clone(), record);
            }
            EventKind::Logout => {
                self.online.remove(&event.username);
                self.offline.insert(event.username.clone(), record);
            }
        }

        Transition::Applied {
            kind: event.kind,
            from,
        }
    }

    /// Offline record with the latest `since`.
    pub fn most_recently_seen(&self) -> Option<&UserRecord> {
        self.offline.values().max_by_key(|record| record.since)
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty() && self.offline.is_empty()
    }
}
