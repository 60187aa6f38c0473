//! Resolver configuration, loadable from TOML.
//!
//! ```toml
//! debounce_ms = 250
//! slot_resolution_minutes = 15
//! time_zone = "Europe/Berlin"
//! failed_attendees = "optimistic"
//! strategy = "rescan"
//! mandatory_roles = ["chair", "required"]
//! allowed_weekdays = ["Mon", "Tue", "Wed", "Thu", "Fri"]
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::time::Duration;

use chrono::{TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::attendee::Role;
use crate::debounce::DEFAULT_DEBOUNCE;
use crate::error::{ResolverError, Result};
use crate::period::Period;
use crate::policy::{
    self, FailedAttendeePolicy, Policy, SweepStrategy, WeekdaySet,
    DEFAULT_SLOT_RESOLUTION_MINUTES,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Quiet period before a sweep runs, in milliseconds.
    pub debounce_ms: u64,
    pub slot_resolution_minutes: i64,
    /// IANA zone used for weekday filtering.
    pub time_zone: String,
    pub failed_attendees: FailedAttendeePolicy,
    pub strategy: SweepStrategy,
    pub mandatory_roles: Vec<Role>,
    pub allowed_weekdays: Vec<Weekday>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            slot_resolution_minutes: DEFAULT_SLOT_RESOLUTION_MINUTES,
            time_zone: "UTC".to_string(),
            failed_attendees: FailedAttendeePolicy::default(),
            strategy: SweepStrategy::default(),
            mandatory_roles: policy::default_mandatory_roles().into_iter().collect(),
            allowed_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }
}

impl ResolverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.slot_resolution()?;
        if self.time_zone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ResolverError::InvalidTimezone(self.time_zone.clone()));
        }
        Ok(())
    }

    fn slot_resolution(&self) -> Result<TimeDelta> {
        TimeDelta::try_minutes(self.slot_resolution_minutes)
            .filter(|resolution| *resolution > TimeDelta::zero())
            .ok_or_else(|| {
                ResolverError::Config(format!(
                    "slot_resolution_minutes must be a positive number of minutes, got {}",
                    self.slot_resolution_minutes
                ))
            })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn weekdays(&self) -> WeekdaySet {
        self.allowed_weekdays.iter().copied().collect()
    }

    /// Policy for a meeting of `meeting_duration` within `timeframe`, using
    /// this configuration's filters.
    pub fn policy(&self, timeframe: Period, meeting_duration: TimeDelta) -> Result<Policy> {
        let mut policy = Policy::new(timeframe, meeting_duration)?;
        policy.set_slot_resolution(self.slot_resolution()?)?;
        policy.set_time_zone_name(&self.time_zone)?;
        policy.set_allowed_weekdays(self.weekdays());
        policy.set_mandatory_roles(self.mandatory_roles.iter().copied().collect());
        policy.set_failed_attendees(self.failed_attendees);
        policy.set_strategy(self.strategy);
        Ok(policy)
    }
}
