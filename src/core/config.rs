//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{PwError, Result};

/// Full playerwatch configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub tail: TailConfig,
    pub presence: PresenceConfig,
    pub feed: FeedConfig,
    pub paths: PathsConfig,
}

/// Where the server log lives and how it is followed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TailConfig {
    /// Directory holding the live log and its rotated archives.
    pub log_dir: PathBuf,
    /// File name of the live (growing) log inside `log_dir`.
    pub live_file: String,
    /// Suffix identifying compressed historical archives.
    pub archive_suffix: String,
    /// Fallback re-read interval when no change notification arrives.
    pub poll_interval_ms: u64,
    /// Bound of the tailer → tracker event channel.
    pub event_channel_capacity: usize,
}

/// Presence state machine knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PresenceConfig {
    /// Skip events re-read after a truncation reset when they are older than
    /// the user's current record. Fresh lines always apply.
    pub ignore_stale_events: bool,
}

/// RSS feed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub path: String,
    pub title: String,
    pub description: String,
}

/// Filesystem paths used by playerwatch itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            live_file: "latest.log".to_string(),
            archive_suffix: ".gz".to_string(),
            poll_interval_ms: 5_000,
            event_channel_capacity: 256,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ignore_stale_events: false,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:9092".to_string(),
            path: "/rss".to_string(),
            title: "Players Online".to_string(),
            description: "Who is logged into the server, and for how long.".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[PW-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("pwatch").join("config.toml"),
            activity_log: home_dir
                .join(".local")
                .join("share")
                .join("pwatch")
                .join("activity.jsonl"),
        }
    }
}

impl TailConfig {
    /// Full path of the live log.
    #[must_use]
    pub fn live_path(&self) -> PathBuf {
        self.log_dir.join(&self.live_file)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PwError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(PwError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Re-run normalization and validation after fields were changed in code
    /// (command-line overrides).
    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.normalize();
        self.validate()
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parsed feed listen address.
    pub fn feed_addr(&self) -> Result<SocketAddr> {
        self.feed
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|error| PwError::InvalidConfig {
                details: format!("feed.listen_addr {:?}: {error}", self.feed.listen_addr),
            })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // tail
        if let Some(raw) = lookup("PW_TAIL_LOG_DIR") {
            self.tail.log_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("PW_TAIL_LIVE_FILE") {
            self.tail.live_file = raw;
        }
        if let Some(raw) = lookup("PW_TAIL_ARCHIVE_SUFFIX") {
            self.tail.archive_suffix = raw;
        }
        if let Some(raw) = lookup("PW_TAIL_POLL_INTERVAL_MS") {
            self.tail.poll_interval_ms = parse_env("PW_TAIL_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("PW_TAIL_EVENT_CHANNEL_CAPACITY") {
            self.tail.event_channel_capacity = parse_env("PW_TAIL_EVENT_CHANNEL_CAPACITY", &raw)?;
        }

        // presence
        if let Some(raw) = lookup("PW_PRESENCE_IGNORE_STALE_EVENTS") {
            self.presence.ignore_stale_events = parse_env("PW_PRESENCE_IGNORE_STALE_EVENTS", &raw)?;
        }

        // feed
        if let Some(raw) = lookup("PW_FEED_ENABLED") {
            self.feed.enabled = parse_env("PW_FEED_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("PW_FEED_LISTEN_ADDR") {
            self.feed.listen_addr = raw;
        }
        if let Some(raw) = lookup("PW_FEED_PATH") {
            self.feed.path = raw;
        }

        // paths
        if let Some(raw) = lookup("PW_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize(&mut self) {
        let s = self.tail.log_dir.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.tail.log_dir = PathBuf::from(stripped);
        }

        if !self.tail.archive_suffix.is_empty() && !self.tail.archive_suffix.starts_with('.') {
            self.tail.archive_suffix.insert(0, '.');
        }

        if !self.feed.path.starts_with('/') {
            self.feed.path.insert(0, '/');
        }
    }

    fn validate(&self) -> Result<()> {
        if self.tail.live_file.trim().is_empty() {
            return Err(PwError::InvalidConfig {
                details: "tail.live_file must not be empty".to_string(),
            });
        }

        if self.tail.live_file.contains('/') {
            return Err(PwError::InvalidConfig {
                details: format!(
                    "tail.live_file must be a bare file name, got {:?}",
                    self.tail.live_file
                ),
            });
        }

        if self.tail.archive_suffix.is_empty() {
            return Err(PwError::InvalidConfig {
                details: "tail.archive_suffix must not be empty".to_string(),
            });
        }

        if self.tail.live_file.ends_with(&self.tail.archive_suffix) {
            return Err(PwError::InvalidConfig {
                details: "tail.live_file must not carry the archive suffix".to_string(),
            });
        }

        if self.tail.poll_interval_ms == 0 {
            return Err(PwError::InvalidConfig {
                details: "tail.poll_interval_ms must be > 0".to_string(),
            });
        }

        if self.tail.event_channel_capacity == 0 {
            return Err(PwError::InvalidConfig {
                details: "tail.event_channel_capacity must be >= 1".to_string(),
            });
        }

        if self.feed.enabled {
            self.feed_addr()?;
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|error| PwError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{Config, PwError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tail.live_path(), PathBuf::from("logs/latest.log"));
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let raw = r#"
            [tail]
            log_dir = "/srv/mc/logs"

            [feed]
            enabled = false
        "#;
        let cfg: Config = toml::from_str(raw).expect("toml should parse");
        assert_eq!(cfg.tail.log_dir, PathBuf::from("/srv/mc/logs"));
        assert_eq!(cfg.tail.live_file, "latest.log");
        assert!(!cfg.feed.enabled);
        assert!(!cfg.presence.ignore_stale_events);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("PW_TAIL_LOG_DIR", "/srv/mc/logs"),
            ("PW_TAIL_LIVE_FILE", "server.log"),
            ("PW_TAIL_POLL_INTERVAL_MS", "250"),
            ("PW_PRESENCE_IGNORE_STALE_EVENTS", "true"),
            ("PW_FEED_LISTEN_ADDR", "127.0.0.1:8080"),
        ]);

        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert_eq!(cfg.tail.live_path(), PathBuf::from("/srv/mc/logs/server.log"));
        assert_eq!(cfg.tail.poll_interval_ms, 250);
        assert!(cfg.presence.ignore_stale_events);
        assert_eq!(cfg.feed.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("PW_TAIL_POLL_INTERVAL_MS", "soon")]);

        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid number should fail");
        match err {
            PwError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("PW_TAIL_POLL_INTERVAL_MS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = Config::default();
        cfg.tail.poll_interval_ms = 0;
        let err = cfg.validate().expect_err("expected poll interval error");
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn zero_channel_capacity_rejected() {
        let mut cfg = Config::default();
        cfg.tail.event_channel_capacity = 0;
        let err = cfg.validate().expect_err("expected capacity error");
        assert!(err.to_string().contains("event_channel_capacity"));
    }

    #[test]
    fn live_file_with_directory_rejected() {
        let mut cfg = Config::default();
        cfg.tail.live_file = "logs/latest.log".to_string();
        let err = cfg.validate().expect_err("expected live_file error");
        assert!(err.to_string().contains("bare file name"));
    }

    #[test]
    fn bad_listen_addr_rejected_only_when_feed_enabled() {
        let mut cfg = Config::default();
        cfg.feed.listen_addr = "not an address".to_string();
        assert!(cfg.validate().is_err());
        cfg.feed.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn normalize_fixes_suffix_feed_path_and_trailing_slash() {
        let mut cfg = Config::default();
        cfg.tail.log_dir = PathBuf::from("/srv/mc/logs/");
        cfg.tail.archive_suffix = "gz".to_string();
        cfg.feed.path = "players".to_string();

        cfg.normalize();

        assert_eq!(cfg.tail.log_dir, PathBuf::from("/srv/mc/logs"));
        assert_eq!(cfg.tail.archive_suffix, ".gz");
        assert_eq!(cfg.feed.path, "/players");
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/pwatch/config.toml")));
        assert!(matches!(result, Err(PwError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tail]\nlive_file = \"server.log\"\n").unwrap();

        let cfg = Config::load(Some(&path)).expect("config should load");
        assert_eq!(cfg.tail.live_file, "server.log");
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_tracks_changes() {
        let cfg = Config::default();
        let h1 = cfg.stable_hash().expect("hash");
        assert_eq!(h1, cfg.stable_hash().expect("hash"));

        let mut modified = Config::default();
        modified.tail.poll_interval_ms += 1;
        assert_ne!(h1, modified.stable_hash().expect("hash"));
    }

    #[test]
    fn toml_output_round_trips() {
        let cfg = Config::default();
        let rendered = cfg.to_toml().expect("render");
        let parsed: Config = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed, cfg);
    }
}
