use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::stream::{scheduler::DEFAULT_INTERVAL, transactions::DEFAULT_BATCH_SIZE};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./sql_app.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9999";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid batch size range {min}..={max}: bounds must be >= 1 and min <= max")]
    InvalidBatchRange { min: usize, max: usize },
    #[error("ingest interval must be greater than zero")]
    ZeroInterval,
    #[error("catalog needs at least one card scheme and one status code")]
    EmptyCatalog,
}

/// Where the transaction store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    /// Parses a `DATABASE_URL` value.
    ///
    /// Accepts `sqlite:///relative.db`, `sqlite:////absolute.db`, a plain
    /// path, and `:memory:` (with or without the `sqlite://` prefix).
    pub fn from_url(url: &str) -> Self {
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .unwrap_or(url);
        if path.is_empty() || path == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(path))
        }
    }
}

/// Runtime settings for the ingestion engine and its HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseLocation,
    pub bind_addr: String,
    pub ingest_interval: Duration,
    pub batch_size: RangeInclusive<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::from_url(DEFAULT_DATABASE_URL),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            ingest_interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// Every key falls back to its default when unset or unparseable.
    ///
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database = lookup("DATABASE_URL")
            .map(|url| DatabaseLocation::from_url(&url))
            .unwrap_or(defaults.database);
        let bind_addr = lookup("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let interval_secs = parse_or(&lookup, "INGEST_INTERVAL_SECS", defaults.ingest_interval.as_secs());
        let batch_min = parse_or(&lookup, "INGEST_BATCH_MIN", *defaults.batch_size.start());
        let batch_max = parse_or(&lookup, "INGEST_BATCH_MAX", *defaults.batch_size.end());

        Self {
            database,
            bind_addr,
            ingest_interval: Duration::from_secs(interval_secs),
            batch_size: batch_min..=batch_max,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.batch_size.is_empty() || *self.batch_size.start() == 0 {
            return Err(ConfigError::InvalidBatchRange {
                min: *self.batch_size.start(),
                max: *self.batch_size.end(),
            });
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring unparseable {key}={raw:?}");
            default
        }),
    }
}
