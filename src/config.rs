// src/config.rs

//! Runtime configuration for the tracker daemon and CLI.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the scheduler, server and CLI.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// SQLite ledger location.
    pub db_path: PathBuf,
    /// HTTP listen address.
    pub bind: SocketAddr,
    /// Pause between automatic scans, measured from scan completion.
    pub scan_interval: Duration,
    /// Upper bound on the adapter snapshot phase of a scan.
    pub adapter_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: "127.0.0.1:8765".parse().expect("valid default address"),
            scan_interval: Duration::from_secs(15 * 60),
            adapter_timeout: Duration::from_secs(10),
        }
    }
}

impl TrackerConfig {
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }
}

/// Default ledger location under the user's data directory, with a relative
/// fallback when no home is available (containers, stripped service users).
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dust")
        .join("dust.db")
}

/// Parse a human duration like `90s`, `15m`, `2h`, `7d` or `1w`.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration".to_string()));
    }

    let (value, unit) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], Some(c)),
        _ => (s, None),
    };

    let value: u64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration: {}", s)))?;

    let secs = match unit {
        None | Some('s') => value,
        Some('m') => value * 60,
        Some('h') => value * 3600,
        Some('d') => value * 86_400,
        Some('w') => value * 7 * 86_400,
        Some(c) => {
            return Err(Error::Config(format!("unknown duration unit '{}'", c)));
        }
    };

    Ok(Duration::from_secs(secs))
}
