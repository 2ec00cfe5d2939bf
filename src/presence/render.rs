//! Display string for the presence table.
//!
//! `"2 players: alex on for 1h 4m, steve on for 12s"` while anyone is online,
//! `"No players for 3h 2m (steve)"` otherwise.

use chrono::{DateTime, Duration, Utc};

use crate::presence::table::{PresenceTable, Timestamp};

/// Name shown when nobody has ever been seen.
pub const NOBODY: &str = "nobody";
/// Duration shown when nobody has ever been seen.
pub const EVER: &str = "ever";

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

/// Render the table as seen at `now`.
#[must_use]
pub fn render(table: &PresenceTable, now: DateTime<Utc>) -> String {
    let online = table.online();

    if online.is_empty() {
        let (howlong, name) = table.most_recently_seen().map_or_else(
            || (EVER.to_string(), NOBODY),
            |record| {
                (
                    format_elapsed(elapsed_since(&record.since, now)),
                    record.username.as_str(),
                )
            },
        );
        return format!("No players for {howlong} ({name})");
    }

    let header = if online.len() == 1 {
        "1 player: ".to_string()
    } else {
        format!("{} players: ", online.len())
    };

    let entries: Vec<String> = online
        .values()
        .map(|record| {
            format!(
                "{} on for {}",
                record.username,
                format_elapsed(elapsed_since(&record.since, now))
            )
        })
        .collect();

    header + &entries.join(", ")
}

/// Format an elapsed time as `"2d 3h"`, `"5m"`, `"45s"`.
///
/// Days, hours and minutes are shown when non-zero. Seconds only appear when
/// all three are zero, so `"0s"` is the floor.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let days = total / SECS_PER_DAY;
    let hours = (total % SECS_PER_DAY) / SECS_PER_HOUR;
    let mins = (total % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let secs = total % SECS_PER_MINUTE;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 {
        parts.push(format!("{mins}m"));
    }
    if parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

fn elapsed_since(since: &Timestamp, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since.with_timezone(&Utc))
}
