//! # Config - shell configuration
//!
//! All settings are read from environment variables:
//!
//! ```text
//! SDSS_SNAPSHOT_PATH  snapshot log file            (default: "snapshot.sdss")
//! SDSS_SOURCES        merge playground sources     (default: 2)
//! SDSS_SCAN           default scan direction       (default: "asc")
//! SDSS_LOG            tracing filter directive     (default: "warn")
//! ```

use std::path::PathBuf;

use merge::Direction;
use thiserror::Error;

pub const SNAPSHOT_PATH_VAR: &str = "SDSS_SNAPSHOT_PATH";
pub const SOURCES_VAR: &str = "SDSS_SOURCES";
pub const SCAN_VAR: &str = "SDSS_SCAN";
pub const LOG_VAR: &str = "SDSS_LOG";

/// Upper bound on playground sources, keeps typos like `SDSS_SOURCES=2000`
/// from allocating a huge set.
pub const MAX_SOURCES: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub snapshot_path: PathBuf,
    /// Number of merge sources; source 0 has the highest priority.
    pub sources: usize,
    pub scan: Direction,
    pub log_filter: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("snapshot.sdss"),
            sources: 2,
            scan: Direction::Asc,
            log_filter: "warn".to_string(),
        }
    }
}

impl CliConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let snapshot_path = lookup(SNAPSHOT_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or(defaults.snapshot_path);

        let sources = match lookup(SOURCES_VAR) {
            Some(raw) => parse_sources(&raw)?,
            None => defaults.sources,
        };

        let scan = match lookup(SCAN_VAR) {
            Some(raw) => parse_direction(&raw).ok_or(ConfigError::Invalid {
                key: SCAN_VAR,
                value: raw,
                reason: "expected asc, desc or any",
            })?,
            None => defaults.scan,
        };

        let log_filter = lookup(LOG_VAR).unwrap_or(defaults.log_filter);

        Ok(Self {
            snapshot_path,
            sources,
            scan,
            log_filter,
        })
    }
}

fn parse_sources(raw: &str) -> Result<usize, ConfigError> {
    let invalid = |reason| ConfigError::Invalid {
        key: SOURCES_VAR,
        value: raw.to_string(),
        reason,
    };
    let n: usize = raw.trim().parse().map_err(|_| invalid("not a number"))?;
    if n == 0 || n > MAX_SOURCES {
        return Err(invalid("must be between 1 and 64"));
    }
    Ok(n)
}

/// Parses `asc`, `desc` or `any`, case-insensitively.
pub fn parse_direction(raw: &str) -> Option<Direction> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "asc" => Some(Direction::Asc),
        "desc" => Some(Direction::Desc),
        "any" => Some(Direction::Any),
        _ => None,
    }
}
