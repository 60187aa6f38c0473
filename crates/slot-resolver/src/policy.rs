//! Search policy: timeframe, weekday filter, mandatory roles and slot granularity.
//!
//! Weekdays and midnights are evaluated in the policy's time zone, so a slot
//! search over a UTC timeframe still respects the user's local calendar days.
//! Setters validate their input and leave the previous value in place on error.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::attendee::Role;
use crate::error::{ResolverError, Result};
use crate::period::Period;

/// Set of allowed weekdays. Bit 0 is Monday, bit 6 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);
    pub const NONE: WeekdaySet = WeekdaySet(0);
    pub const WORKWEEK: WeekdaySet = WeekdaySet(0b001_1111);

    /// Build from the low seven bits; higher bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111_1111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | (1 << day.num_days_from_monday()))
    }

    pub fn without(self, day: Weekday) -> Self {
        Self(self.0 & !(1 << day.num_days_from_monday()))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().fold(WeekdaySet::NONE, WeekdaySet::with)
    }
}

/// How a mandatory attendee whose busy data failed to load is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedAttendeePolicy {
    /// Treat the attendee as free for the whole timeframe.
    #[default]
    Optimistic,
    /// Treat the attendee as busy for the whole timeframe.
    Pessimistic,
}

/// Algorithm used to find the next conflict-free window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepStrategy {
    /// Check attendees one by one, rescanning from the first after every advance.
    #[default]
    Rescan,
    /// Merge every mandatory busy set once and search the gaps of the union.
    MergedBoundaries,
}

pub fn default_mandatory_roles() -> BTreeSet<Role> {
    BTreeSet::from([Role::Chair, Role::Required])
}

pub const DEFAULT_SLOT_RESOLUTION_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    timeframe: Period,
    meeting_duration: TimeDelta,
    slot_resolution: TimeDelta,
    allowed_weekdays: WeekdaySet,
    mandatory_roles: BTreeSet<Role>,
    time_zone: Tz,
    failed_attendees: FailedAttendeePolicy,
    strategy: SweepStrategy,
}

impl Policy {
    /// Policy with default filters for a meeting of `meeting_duration` within `timeframe`.
    pub fn new(timeframe: Period, meeting_duration: TimeDelta) -> Result<Self> {
        if meeting_duration <= TimeDelta::zero() {
            return Err(ResolverError::InvalidDuration(meeting_duration));
        }
        Ok(Self {
            timeframe,
            meeting_duration,
            slot_resolution: TimeDelta::minutes(DEFAULT_SLOT_RESOLUTION_MINUTES),
            allowed_weekdays: WeekdaySet::ALL,
            mandatory_roles: default_mandatory_roles(),
            time_zone: Tz::UTC,
            failed_attendees: FailedAttendeePolicy::default(),
            strategy: SweepStrategy::default(),
        })
    }

    pub fn timeframe(&self) -> Period {
        self.timeframe
    }

    pub fn meeting_duration(&self) -> TimeDelta {
        self.meeting_duration
    }

    pub fn slot_resolution(&self) -> TimeDelta {
        self.slot_resolution
    }

    pub fn allowed_weekdays(&self) -> WeekdaySet {
        self.allowed_weekdays
    }

    pub fn mandatory_roles(&self) -> &BTreeSet<Role> {
        &self.mandatory_roles
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn failed_attendees(&self) -> FailedAttendeePolicy {
        self.failed_attendees
    }

    pub fn strategy(&self) -> SweepStrategy {
        self.strategy
    }

    /// The meeting window as currently requested: the first `meeting_duration`
    /// of the timeframe.
    pub fn requested_window(&self) -> Period {
        Period::starting_at(self.timeframe.start(), self.meeting_duration)
            .unwrap_or(self.timeframe)
    }

    pub fn set_timeframe(&mut self, timeframe: Period) {
        self.timeframe = timeframe;
    }

    pub fn set_meeting_duration(&mut self, duration: TimeDelta) -> Result<()> {
        if duration <= TimeDelta::zero() {
            return Err(ResolverError::InvalidDuration(duration));
        }
        self.meeting_duration = duration;
        Ok(())
    }

    pub fn set_slot_resolution(&mut self, resolution: TimeDelta) -> Result<()> {
        if resolution <= TimeDelta::zero() {
            return Err(ResolverError::InvalidSlotResolution(resolution));
        }
        self.slot_resolution = resolution;
        Ok(())
    }

    pub fn set_allowed_weekdays(&mut self, weekdays: WeekdaySet) {
        self.allowed_weekdays = weekdays;
    }

    pub fn set_mandatory_roles(&mut self, roles: BTreeSet<Role>) {
        self.mandatory_roles = roles;
    }

    pub fn set_time_zone(&mut self, tz: Tz) {
        self.time_zone = tz;
    }

    /// Parse and set an IANA time zone name (e.g. "Europe/Berlin").
    pub fn set_time_zone_name(&mut self, name: &str) -> Result<()> {
        let tz: Tz = name
            .parse()
            .map_err(|_| ResolverError::InvalidTimezone(name.to_string()))?;
        self.time_zone = tz;
        Ok(())
    }

    pub fn set_failed_attendees(&mut self, policy: FailedAttendeePolicy) {
        self.failed_attendees = policy;
    }

    pub fn set_strategy(&mut self, strategy: SweepStrategy) {
        self.strategy = strategy;
    }

    /// Round `t` up to the next multiple of the slot resolution, counted from
    /// the timeframe start.
    ///
    /// `None` when the rounded instant is not representable.
    pub fn align_up(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let origin = self.timeframe.start();
        if t <= origin {
            return Some(origin);
        }
        let step = self.slot_resolution.num_milliseconds().max(1);
        let offset = (t - origin).num_milliseconds();
        let steps = offset / step + i64::from(offset % step != 0);
        let aligned = TimeDelta::try_milliseconds(steps.checked_mul(step)?)?;
        origin.checked_add_signed(aligned)
    }

    fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.time_zone).date_naive()
    }

    pub fn is_allowed_day(&self, t: DateTime<Utc>) -> bool {
        self.allowed_weekdays.contains(self.local_date(t).weekday())
    }

    /// First local midnight strictly after the day containing `t` that falls on
    /// an allowed weekday. `None` when no weekday is allowed.
    pub fn next_allowed_day_start(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = self.local_date(t);
        (1..=7u64)
            .filter_map(|n| today.checked_add_days(Days::new(n)))
            .find(|day| self.allowed_weekdays.contains(day.weekday()))
            .and_then(|day| self.day_start(day))
    }

    /// Local midnight ending the run of allowed days that contains `t`.
    ///
    /// `None` when every weekday is allowed, since the run never ends.
    pub fn allowed_run_end(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.allowed_weekdays == WeekdaySet::ALL {
            return None;
        }
        let today = self.local_date(t);
        (1..=7u64)
            .filter_map(|n| today.checked_add_days(Days::new(n)))
            .find(|day| !self.allowed_weekdays.contains(day.weekday()))
            .and_then(|day| self.day_start(day))
    }

    /// UTC instant of the first valid local time on `day`.
    ///
    /// Zones that skip midnight on a DST change start the day at the first
    /// existing hour instead.
    fn day_start(&self, day: NaiveDate) -> Option<DateTime<Utc>> {
        (0..3u32).find_map(|hour| {
            let local = day.and_hms_opt(hour, 0, 0)?;
            self.time_zone
                .from_local_datetime(&local)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}
