//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use playerwatch::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PwError, Result};

// Tail
pub use crate::tail::cursor::LogCursor;
pub use crate::tail::extract::EventExtractor;
pub use crate::tail::source::LogSource;
pub use crate::tail::tailer::{LogTailer, TailStats};
pub use crate::tail::watch::{ChangeNotifier, FsChangeNotifier, WatchSignal};

// Presence
pub use crate::presence::render::{format_elapsed, render};
pub use crate::presence::table::{EventKind, PresenceEvent, PresenceTable, Timestamp, UserRecord};
pub use crate::presence::tracker::{PresenceTracker, PresenceView};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{DaemonArgs, PresenceDaemon};
