//! Scenario files: a timeframe, a meeting length and the attendees with their
//! calendars.
//!
//! ```json
//! {
//!   "timeframe": { "start": "2026-03-16T09:00:00Z", "end": "2026-03-16T17:00:00Z" },
//!   "duration_minutes": 60,
//!   "allowed_weekdays": ["Mon", "Tue", "Wed", "Thu", "Fri"],
//!   "attendees": [
//!     { "id": "alice", "role": "chair", "busy": [
//!       { "start": "2026-03-16T09:00:00Z", "end": "2026-03-16T10:30:00Z" }
//!     ] },
//!     { "id": "bob", "fail": true }
//!   ]
//! }
//! ```
//!
//! Policy keys present in the scenario override the TOML config.

use anyhow::{Context, Result};
use chrono::{TimeDelta, Weekday};
use serde::Deserialize;
use slot_resolver::{AttendeeId, FailedAttendeePolicy, Period, ResolverConfig, Role, StaticFetcher};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub timeframe: Period,
    pub duration_minutes: i64,
    #[serde(default)]
    pub slot_resolution_minutes: Option<i64>,
    #[serde(default)]
    pub allowed_weekdays: Option<Vec<Weekday>>,
    #[serde(default)]
    pub mandatory_roles: Option<Vec<Role>>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub failed_attendees: Option<FailedAttendeePolicy>,
    #[serde(default)]
    pub attendees: Vec<ScenarioAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioAttendee {
    pub id: AttendeeId,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub busy: Vec<Period>,
    /// Simulate a free/busy lookup failure for this attendee.
    #[serde(default)]
    pub fail: bool,
}

fn default_role() -> Role {
    Role::Required
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse scenario JSON")
    }

    pub fn meeting_duration(&self) -> Result<TimeDelta> {
        TimeDelta::try_minutes(self.duration_minutes)
            .with_context(|| format!("duration_minutes out of range: {}", self.duration_minutes))
    }

    /// Layer the scenario's policy keys over `config`.
    pub fn apply_to(&self, config: &mut ResolverConfig) {
        if let Some(minutes) = self.slot_resolution_minutes {
            config.slot_resolution_minutes = minutes;
        }
        if let Some(days) = &self.allowed_weekdays {
            config.allowed_weekdays = days.clone();
        }
        if let Some(roles) = &self.mandatory_roles {
            config.mandatory_roles = roles.clone();
        }
        if let Some(tz) = &self.time_zone {
            config.time_zone = tz.clone();
        }
        if let Some(policy) = self.failed_attendees {
            config.failed_attendees = policy;
        }
    }

    /// An in-memory calendar source answering from the scenario's busy lists.
    pub fn fetcher(&self) -> StaticFetcher {
        self.attendees.iter().fold(StaticFetcher::new(), |fetcher, a| {
            if a.fail {
                fetcher.fail(a.id.clone())
            } else {
                fetcher.with_busy(a.id.clone(), a.busy.clone())
            }
        })
    }
}
