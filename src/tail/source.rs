//! Line sources: the plain live log (offset-resumed) and gzip archives (read once).
//!
//! Plain files are read from the cursor's offset up to the last complete line;
//! a trailing partial line stays on disk for the next pass. Archives are
//! immutable snapshots, decompressed and read start to end every run.

#![allow(missing_docs)]

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use flate2::read::MultiGzDecoder;
use regex::Regex;

use crate::core::errors::{PwError, Result};
use crate::tail::cursor::{LogCursor, ResumePoint};

/// How a file's bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Plain,
    Compressed,
}

/// Result of one read pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadPass {
    /// Lines handed to the callback.
    pub lines: u64,
    /// File length seen when the pass started (plain files only).
    pub observed_len: u64,
    /// Offset the file had been consumed to before a truncation reset.
    pub truncated_from: Option<u64>,
}

/// Where a live line sits relative to a truncation reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Never handed out before.
    Fresh,
    /// Starts below the offset consumed before the file was truncated.
    Reread,
}

/// One log file and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSource {
    path: PathBuf,
    kind: SourceKind,
}

impl LogSource {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Plain,
        }
    }

    pub fn compressed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: SourceKind::Compressed,
        }
    }

    /// Pick the kind from the file name.
    pub fn classify(path: impl Into<PathBuf>, archive_suffix: &str) -> Self {
        let path = path.into();
        let compressed = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(archive_suffix));
        if compressed {
            Self::compressed(path)
        } else {
            Self::plain(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Date injected into lines that only carry a time of day.
    ///
    /// The live log uses today's date in `zone`. Archives use the
    /// `YYYY-MM-DD` embedded in their name, else their modification time.
    pub fn log_date(&self, zone: &FixedOffset) -> Result<NaiveDate> {
        match self.kind {
            SourceKind::Plain => Ok(Utc::now().with_timezone(zone).date_naive()),
            SourceKind::Compressed => {
                if let Some((date, _)) = self
                    .path
                    .file_name()
                    .and_then(|name| embedded_date(&name.to_string_lossy()))
                {
                    return Ok(date);
                }
                let modified = fs::metadata(&self.path)
                    .and_then(|meta| meta.modified())
                    .map_err(|source| PwError::io(&self.path, source))?;
                Ok(DateTime::<Utc>::from(modified)
                    .with_timezone(zone)
                    .date_naive())
            }
        }
    }

    /// Read the complete lines appended since the cursor's offset, then
    /// advance the cursor past them.
    ///
    /// Stops early, without losing the unread remainder, when `each` breaks.
    /// After a truncation reset, lines starting below the old offset are
    /// tagged [`LineOrigin::Reread`].
    pub fn read_new_lines<F>(&self, cursor: &mut LogCursor, mut each: F) -> Result<ReadPass>
    where
        F: FnMut(&str, LineOrigin) -> ControlFlow<()>,
    {
        let mut file = File::open(&self.path).map_err(|source| PwError::io(&self.path, source))?;
        let len = file
            .metadata()
            .map_err(|source| PwError::io(&self.path, source))?
            .len();

        let resume = cursor.resume_from(len);
        let mut pass = ReadPass {
            lines: 0,
            observed_len: len,
            truncated_from: match resume {
                ResumePoint::Truncated { previous } => Some(previous),
                ResumePoint::Continue(_) => None,
            },
        };

        let mut position = resume.start();
        file.seek(SeekFrom::Start(position))
            .map_err(|source| PwError::io(&self.path, source))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| PwError::io(&self.path, source))?;
            // EOF, or a line still being written.
            if n == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            let origin = match pass.truncated_from {
                Some(previous) if position < previous => LineOrigin::Reread,
                _ => LineOrigin::Fresh,
            };
            position += n as u64;
            pass.lines += 1;
            if each(&decode_line(&buf), origin).is_break() {
                break;
            }
        }

        cursor.commit(position);
        Ok(pass)
    }

    /// Decompress the whole archive and hand over every line, the last one
    /// included even without a trailing newline.
    pub fn read_all_lines<F>(&self, mut each: F) -> Result<ReadPass>
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let file = File::open(&self.path).map_err(|source| PwError::io(&self.path, source))?;
        let mut reader: Box<dyn BufRead> = match self.kind {
            SourceKind::Compressed => Box::new(BufReader::new(MultiGzDecoder::new(
                BufReader::new(file),
            ))),
            SourceKind::Plain => Box::new(BufReader::new(file)),
        };

        let mut pass = ReadPass::default();
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| self.read_error(source))?;
            if n == 0 {
                break;
            }
            pass.lines += 1;
            if each(&decode_line(&buf)).is_break() {
                break;
            }
        }
        Ok(pass)
    }

    fn read_error(&self, source: io::Error) -> PwError {
        match self.kind {
            SourceKind::Compressed => PwError::Decompress {
                path: self.path.clone(),
                details: source.to_string(),
            },
            SourceKind::Plain => PwError::io(&self.path, source),
        }
    }
}

/// `YYYY-MM-DD`, optionally followed by `-N` rotation digits.
const ARCHIVE_DATE: &str = r"(?P<date>\d{4}-\d{2}-\d{2})(?:-(?P<index>\d+))?";

fn archive_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ARCHIVE_DATE).ok()).as_ref()
}

/// Find a `YYYY-MM-DD` in a file name, plus the rotation index that follows it
/// (`2014-03-02-3.log.gz` → index 3; no index → 0).
pub fn embedded_date(name: &str) -> Option<(NaiveDate, u32)> {
    archive_date_pattern()?.captures_iter(name).find_map(|caps| {
        let date = NaiveDate::parse_from_str(&caps["date"], "%Y-%m-%d").ok()?;
        let index = caps
            .name("index")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        Some((date, index))
    })
}

fn decode_line(buf: &[u8]) -> Cow<'_, str> {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end])
}
