//! Property-based tests for the presence table and renderer.
//!
//! Arbitrary event sequences over a small user pool must keep the table
//! consistent: no user in both maps, last event wins, and the rendered
//! header agrees with the online count.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use proptest::prelude::*;

use crate::core::config::PresenceConfig;
use crate::logger::activity::ActivityLoggerHandle;
use crate::presence::render::{format_elapsed, render};
use crate::presence::table::{EventKind, PresenceEvent, PresenceState, PresenceTable};
use crate::presence::tracker::PresenceTracker;

// ──────────────────── strategies ────────────────────

const USERS: [&str; 5] = ["alex", "notch", "steve", "jeb", "dinnerbone"];

fn base() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2014, 3, 2, 0, 0, 0)
        .unwrap()
}

fn arb_event() -> impl Strategy<Value = PresenceEvent> {
    (0..USERS.len(), any::<bool>(), 0i64..86_400).prop_map(|(user, login, secs)| {
        let at = base() + chrono::Duration::seconds(secs);
        if login {
            PresenceEvent::login(USERS[user], at)
        } else {
            PresenceEvent::logout(USERS[user], at)
        }
    })
}

fn assert_disjoint(table: &PresenceTable) {
    for name in table.online().keys() {
        assert!(
            !table.offline().contains_key(name),
            "{name} is both online and offline"
        );
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 3, 3, 0, 0, 0).unwrap()
}

// ──────────────────── property tests ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// No sequence of raw applies puts a user in both maps.
    #[test]
    fn no_user_in_both_maps(events in prop::collection::vec(arb_event(), 0..60)) {
        let mut table = PresenceTable::new();
        for event in &events {
            table.apply(event);
            assert_disjoint(&table);
        }
    }

    /// Without the stale guard, the last event per user decides their state.
    #[test]
    fn last_event_wins(events in prop::collection::vec(arb_event(), 1..60)) {
        let mut table = PresenceTable::new();
        for event in &events {
            table.apply(event);
        }
        for user in USERS {
            let expected = match events.iter().rev().find(|e| e.username == user) {
                None => PresenceState::Absent,
                Some(e) if e.kind == EventKind::Login => PresenceState::Online,
                Some(_) => PresenceState::LastSeen,
            };
            prop_assert_eq!(table.state_of(user), expected);
        }
    }

    /// With the stale guard on, re-reading the whole history after a
    /// truncation reset leaves the table exactly as it was.
    #[test]
    fn replay_after_truncation_is_absorbed(events in prop::collection::vec(arb_event(), 1..40)) {
        let mut sorted = events;
        sorted.sort_by_key(|e| e.timestamp);

        let mut tracker = PresenceTracker::new(
            &PresenceConfig { ignore_stale_events: true },
            ActivityLoggerHandle::noop(),
        );
        for event in &sorted {
            tracker.apply(event);
        }
        let before = tracker.view().snapshot();

        for event in &sorted {
            tracker.apply(&event.clone().into_reread());
        }
        prop_assert_eq!(tracker.view().snapshot(), before);
    }

    /// Fresh events are never dropped, in any order: with the stale guard on,
    /// the table matches a plain replay of the same sequence.
    #[test]
    fn stale_guard_ignores_fresh_events(events in prop::collection::vec(arb_event(), 0..60)) {
        let mut guarded = PresenceTracker::new(
            &PresenceConfig { ignore_stale_events: true },
            ActivityLoggerHandle::noop(),
        );
        let mut table = PresenceTable::new();
        for event in &events {
            guarded.apply(event);
            table.apply(event);
        }
        prop_assert_eq!(guarded.view().snapshot(), table);
        prop_assert_eq!(guarded.stats().stale, 0);
    }

    /// The header always agrees with the online count.
    #[test]
    fn header_matches_online_count(events in prop::collection::vec(arb_event(), 0..60)) {
        let mut table = PresenceTable::new();
        for event in &events {
            table.apply(event);
        }
        let shown = render(&table, now());
        match table.online().len() {
            0 => prop_assert!(shown.starts_with("No players for "), "{}", shown),
            1 => prop_assert!(shown.starts_with("1 player: "), "{}", shown),
            n => {
                let prefix = format!("{n} players: ");
                prop_assert!(shown.starts_with(&prefix), "{}", shown);
            }
        }
    }

    /// Duration text is never empty and never has stray spaces.
    #[test]
    fn elapsed_text_is_well_formed(secs in -1_000i64..10_000_000) {
        let text = format_elapsed(chrono::Duration::seconds(secs));
        prop_assert!(!text.is_empty());
        prop_assert_eq!(text.trim(), text.as_str());
        prop_assert!(!text.contains("  "));
    }
}
