//! Error types for slot-resolver operations.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Invalid period: start {start} is not before end {end}")]
    InvalidPeriod {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid slot resolution: {0} (must be positive)")]
    InvalidSlotResolution(TimeDelta),

    #[error("Invalid meeting duration: {0} (must be positive)")]
    InvalidDuration(TimeDelta),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resolver service is no longer running")]
    ServiceClosed,
}

impl From<toml::de::Error> for ResolverError {
    fn from(err: toml::de::Error) -> Self {
        ResolverError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;
