//! # Config - driver settings
//!
//! Settings are read from `SHOAL_*` environment variables. Missing or
//! unparseable values fall back to the defaults below.
//!
//! ```text
//! SHOAL_WAL_PATH     log file path                    (default: "wal.log")
//! SHOAL_WAL_SYNC     fsync after every logical record (default: "true")
//! SHOAL_ARENA_BLOCK  arena block size in bytes        (default: 4096)
//! SHOAL_LOG          tracing filter directive         (default: "warn")
//! ```

use std::path::PathBuf;

pub const ENV_WAL_PATH: &str = "SHOAL_WAL_PATH";
pub const ENV_WAL_SYNC: &str = "SHOAL_WAL_SYNC";
pub const ENV_ARENA_BLOCK: &str = "SHOAL_ARENA_BLOCK";
pub const ENV_LOG: &str = "SHOAL_LOG";

pub const DEFAULT_WAL_PATH: &str = "wal.log";
pub const DEFAULT_ARENA_BLOCK: usize = 4096;
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Smallest block size the arena accepts.
pub const MIN_ARENA_BLOCK: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub wal_path: PathBuf,
    pub wal_sync: bool,
    pub arena_block_size: usize,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from(DEFAULT_WAL_PATH),
            wal_sync: true,
            arena_block_size: DEFAULT_ARENA_BLOCK,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let wal_path = lookup(ENV_WAL_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.wal_path);
        let wal_sync = lookup(ENV_WAL_SYNC)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.wal_sync);
        let arena_block_size = lookup(ENV_ARENA_BLOCK)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n >= MIN_ARENA_BLOCK)
            .unwrap_or(defaults.arena_block_size);
        let log_filter = lookup(ENV_LOG)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        Self {
            wal_path,
            wal_sync,
            arena_block_size,
            log_filter,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
