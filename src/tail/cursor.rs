//! Byte-offset cursor into one plain log file.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

/// Where the next read pass starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Continue from the stored offset.
    Continue(u64),
    /// The file shrank below the stored offset; restart from the beginning.
    ///
    /// Lines before `previous` may be read a second time.
    Truncated { previous: u64 },
}

impl ResumePoint {
    pub const fn start(self) -> u64 {
        match self {
            Self::Continue(offset) => offset,
            Self::Truncated { .. } => 0,
        }
    }
}

/// Tracks how far into a file has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCursor {
    path: PathBuf,
    offset: u64,
}

impl LogCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Decide where to start given the file's current size, resetting the
    /// offset when the file is smaller than what was already consumed.
    pub fn resume_from(&mut self, observed_len: u64) -> ResumePoint {
        if observed_len < self.offset {
            let previous = self.offset;
            self.offset = 0;
            ResumePoint::Truncated { previous }
        } else {
            ResumePoint::Continue(self.offset)
        }
    }

    /// Record the position reached by a completed read pass.
    pub fn commit(&mut self, offset: u64) {
        self.offset = offset;
    }
}
