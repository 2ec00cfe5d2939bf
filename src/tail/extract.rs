//! Login/logout extraction from raw server log lines.
//!
//! Two line shapes are recognized:
//!
//! ```text
//! [12:01:15] [Server thread/INFO]: Steve[/127.0.0.1:5000] logged in with entity id 123
//! 2014-03-02 12:01:15 [INFO] Steve[/127.0.0.1:5000] logged in with entity id 123
//! ```
//!
//! The first carries only a time of day; the date comes from the source file.
//! The second (legacy) carries its own date. Both are interpreted in the zone
//! offset captured when the extractor was built.

use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::{Captures, Regex};

use crate::core::errors::{PwError, Result};
use crate::presence::table::{PresenceEvent, Timestamp};

const LINE_PREFIX: &str = r"^(?:\[(?P<time>\d{1,2}:\d{2}:\d{2})\]|(?P<stamp>\d{4}-\d{2}-\d{2} \d{1,2}:\d{2}:\d{2}))(?: \[[^\]]*\])+:? ";
const LOGIN_TAIL: &str = r"(?P<user>[^\s\[]+)(?: ?\[[^\]]*\])? logged in with entity id";
const LOGOUT_TAIL: &str = r"(?P<user>[^\s\[]+) lost connection:";

/// Compiled patterns plus the zone used to resolve timestamps.
#[derive(Debug, Clone)]
pub struct EventExtractor {
    login: Regex,
    logout: Regex,
    zone: FixedOffset,
}

impl EventExtractor {
    /// Build an extractor that resolves timestamps in `zone`.
    pub fn new(zone: FixedOffset) -> Result<Self> {
        Ok(Self {
            login: compile(&format!("{LINE_PREFIX}{LOGIN_TAIL}"))?,
            logout: compile(&format!("{LINE_PREFIX}{LOGOUT_TAIL}"))?,
            zone,
        })
    }

    /// Build an extractor using the process's current local offset.
    ///
    /// The offset is sampled once; a DST change while running is not picked up.
    pub fn with_local_zone() -> Result<Self> {
        Self::new(*Local::now().offset())
    }

    #[must_use]
    pub const fn zone(&self) -> FixedOffset {
        self.zone
    }

    /// Turn one line into at most one event.
    ///
    /// Login is tried before logout. Lines that match neither, or whose
    /// timestamp does not parse, yield `None`.
    #[must_use]
    pub fn extract(&self, line: &str, log_date: NaiveDate) -> Option<PresenceEvent> {
        if let Some(caps) = self.login.captures(line) {
            let at = self.timestamp(&caps, log_date)?;
            return Some(PresenceEvent::login(&caps["user"], at));
        }
        if let Some(caps) = self.logout.captures(line) {
            let at = self.timestamp(&caps, log_date)?;
            return Some(PresenceEvent::logout(&caps["user"], at));
        }
        None
    }

    fn timestamp(&self, caps: &Captures<'_>, log_date: NaiveDate) -> Option<Timestamp> {
        let naive = if let Some(stamp) = caps.name("stamp") {
            NaiveDateTime::parse_from_str(stamp.as_str(), "%Y-%m-%d %H:%M:%S").ok()?
        } else {
            let time = NaiveTime::parse_from_str(caps.name("time")?.as_str(), "%H:%M:%S").ok()?;
            log_date.and_time(time)
        };
        self.zone.from_local_datetime(&naive).single()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| PwError::Runtime {
        details: format!("invalid line pattern: {err}"),
    })
}
