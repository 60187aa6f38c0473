//! Half-open time periods and the interval algebra used by slot search.
//!
//! Every function here is pure. Functions taking a slice of periods expect it to
//! be *merged*: sorted by start, non-overlapping and non-touching, which is the
//! shape [`merge_periods`] produces.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ResolverError, Result};

/// A half-open interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct Period {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawPeriod> for Period {
    type Error = ResolverError;

    fn try_from(raw: RawPeriod) -> Result<Self> {
        Period::new(raw.start, raw.end)
    }
}

impl Period {
    /// Build a period, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(ResolverError::InvalidPeriod { start, end })
        }
    }

    /// Caller guarantees `start < end`.
    pub(crate) fn new_unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "period start {start} must precede end {end}");
        Self { start, end }
    }

    /// Build a period from a start instant and a positive length.
    ///
    /// Fails with `InvalidDuration` when the end falls outside the
    /// representable range.
    pub fn starting_at(start: DateTime<Utc>, length: TimeDelta) -> Result<Self> {
        let end = start
            .checked_add_signed(length)
            .ok_or(ResolverError::InvalidDuration(length))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Two periods overlap iff `a.start < b.end && b.start < a.end`.
    ///
    /// Adjacent periods (one ends exactly when the other starts) do NOT overlap.
    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely within `self`.
    pub fn contains(&self, other: &Period) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `window`, or `None` when they do not overlap.
    pub fn clip(&self, window: &Period) -> Option<Period> {
        if !self.overlaps(window) {
            return None;
        }
        Some(Period {
            start: self.start.max(window.start),
            end: self.end.min(window.end),
        })
    }
}

/// Merge overlapping or touching periods.
///
/// Sorts the input, then delegates to [`merge_sorted`].
pub fn merge_periods(periods: impl IntoIterator<Item = Period>) -> Vec<Period> {
    let mut sorted: Vec<Period> = periods.into_iter().collect();
    sorted.sort();
    merge_sorted(&sorted)
}

/// Coalesce already-sorted periods in a single left-to-right sweep.
///
/// Periods that touch (`a.end == b.start`) are joined as well, so the output
/// never contains a zero-length gap.
pub fn merge_sorted(sorted: &[Period]) -> Vec<Period> {
    let mut merged: Vec<Period> = Vec::with_capacity(sorted.len());
    for period in sorted {
        if let Some(last) = merged.last_mut() {
            if period.start <= last.end {
                last.end = last.end.max(period.end);
                continue;
            }
        }
        merged.push(*period);
    }
    merged
}

/// Merge `incoming` into an existing merged set.
pub fn merge_into(existing: &[Period], incoming: &[Period]) -> Vec<Period> {
    merge_periods(existing.iter().chain(incoming.iter()).copied())
}

/// First period in a merged set that overlaps `window`.
///
/// Binary-searches for the first period ending after `window.start`; since the
/// set is merged, that is the only candidate that can overlap.
pub fn first_overlapping<'a>(merged: &'a [Period], window: &Period) -> Option<&'a Period> {
    let idx = merged.partition_point(|p| p.end <= window.start);
    merged.get(idx).filter(|p| p.start < window.end)
}

/// Start of the first busy period in a merged set that begins at or after `at`.
pub fn next_busy_start(merged: &[Period], at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let idx = merged.partition_point(|p| p.start < at);
    merged.get(idx).map(|p| p.start)
}

/// Find the first gap of at least `min_duration` between `from` and `until`.
///
/// Gaps are measured against a merged busy set. The returned period is the
/// whole gap (clipped to `[from, until)`), not just `min_duration` of it.
pub fn first_gap_after(
    merged: &[Period],
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    min_duration: TimeDelta,
) -> Option<Period> {
    let mut cursor = from;
    let start_idx = merged.partition_point(|p| p.end <= from);

    for busy in &merged[start_idx..] {
        if busy.start >= until {
            break;
        }
        if busy.start > cursor && busy.start - cursor >= min_duration {
            return Some(Period {
                start: cursor,
                end: busy.start,
            });
        }
        cursor = cursor.max(busy.end);
    }

    // Trailing gap after the last busy period.
    if cursor < until && until - cursor >= min_duration {
        return Some(Period {
            start: cursor,
            end: until,
        });
    }
    None
}
