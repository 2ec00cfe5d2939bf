//! Log reading: cursor, sources, line extraction, change notification, and the
//! tailer that ties them together.

pub mod cursor;
pub mod extract;
pub mod source;
pub mod tailer;
pub mod watch;
