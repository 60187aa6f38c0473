//! Find conflict-free meeting windows for the mandatory attendees.
//!
//! A candidate start is admissible when it sits on a slot-resolution boundary,
//! its day is an allowed weekday, and the whole window fits both in the
//! timeframe and in the run of allowed days it starts in. Among admissible
//! candidates the search returns the earliest one whose window overlaps no
//! mandatory attendee's busy periods.
//!
//! Two strategies are available (see [`SweepStrategy`]). They return the same
//! slots; `MergedBoundaries` avoids rescanning every attendee after each advance.

use std::borrow::Cow;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::attendee::{AttendeeBusyState, AttendeeId, LoadState};
use crate::period::{self, Period};
use crate::policy::{FailedAttendeePolicy, Policy, SweepStrategy};

/// Busy periods of one mandatory attendee, as seen by the search.
#[derive(Debug, Clone)]
pub struct BusyConstraint<'a> {
    pub attendee: &'a AttendeeId,
    pub busy: Cow<'a, [Period]>,
}

/// Result of a single [`SlotSearch::find_next`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// A window of exactly the meeting duration that no mandatory attendee is busy in.
    Found { slot: Period, conflicts: usize },
    /// No admissible window before the timeframe ends.
    Exhausted { conflicts: usize },
}

impl SearchOutcome {
    pub fn slot(&self) -> Option<Period> {
        match self {
            SearchOutcome::Found { slot, .. } => Some(*slot),
            SearchOutcome::Exhausted { .. } => None,
        }
    }

    /// Distinct attendees in conflict during the last pass that had any.
    ///
    /// A pass cut short by the timeframe end checks its remaining attendees
    /// against the last window that still fit.
    pub fn conflicts(&self) -> usize {
        match self {
            SearchOutcome::Found { conflicts, .. } | SearchOutcome::Exhausted { conflicts } => {
                *conflicts
            }
        }
    }
}

/// Build the constraints for every mandatory attendee.
///
/// Attendees still loading contribute whatever busy data is already known
/// (nothing, for a first fetch). Failed attendees follow the policy's
/// [`FailedAttendeePolicy`]. Attendees without busy periods are dropped since
/// they can never conflict.
pub fn mandatory_constraints<'a>(
    policy: &Policy,
    attendees: impl IntoIterator<Item = &'a AttendeeBusyState>,
) -> Vec<BusyConstraint<'a>> {
    attendees
        .into_iter()
        .filter(|attendee| attendee.is_mandatory(policy))
        .filter_map(|attendee| {
            let busy = match attendee.load_state() {
                LoadState::Failed => match policy.failed_attendees() {
                    FailedAttendeePolicy::Optimistic => return None,
                    FailedAttendeePolicy::Pessimistic => Cow::Owned(vec![policy.timeframe()]),
                },
                LoadState::NotRequested | LoadState::Loading | LoadState::Loaded => {
                    Cow::Borrowed(attendee.busy_periods())
                }
            };
            (!busy.is_empty()).then_some(BusyConstraint {
                attendee: attendee.id(),
                busy,
            })
        })
        .collect()
}

pub struct SlotSearch<'a> {
    policy: &'a Policy,
    constraints: Vec<BusyConstraint<'a>>,
    merged: Vec<Period>,
}

impl<'a> SlotSearch<'a> {
    pub fn new(policy: &'a Policy, constraints: Vec<BusyConstraint<'a>>) -> Self {
        let merged = period::merge_periods(
            constraints
                .iter()
                .flat_map(|constraint| constraint.busy.iter().copied()),
        );
        Self {
            policy,
            constraints,
            merged,
        }
    }

    /// Union of every constraint's busy periods.
    pub fn merged_busy(&self) -> &[Period] {
        &self.merged
    }

    /// Number of constraints busy at some point during `window`.
    pub fn conflicts_at(&self, window: &Period) -> usize {
        self.constraints
            .iter()
            .filter(|c| period::first_overlapping(&c.busy, window).is_some())
            .count()
    }

    /// Earliest admissible conflict-free window starting at or after `from`.
    pub fn find_next(&self, from: DateTime<Utc>) -> SearchOutcome {
        match self.policy.strategy() {
            SweepStrategy::Rescan => self.find_next_rescan(from),
            SweepStrategy::MergedBoundaries => self.find_next_merged(from),
        }
    }

    /// Enumerate every free slot of the timeframe.
    ///
    /// Each found window is widened to its maximal free extent: up to the next
    /// busy period, the end of the allowed-weekday run, or the timeframe end.
    /// The next search continues from the widened slot's end.
    pub fn find_all(&self) -> Vec<Period> {
        let timeframe = self.policy.timeframe();
        let mut slots = Vec::new();
        let mut from = timeframe.start();

        while let SearchOutcome::Found { slot, .. } = self.find_next(from) {
            let mut end = timeframe.end();
            if let Some(busy_start) = period::next_busy_start(&self.merged, slot.start()) {
                end = end.min(busy_start);
            }
            if let Some(run_end) = self.policy.allowed_run_end(slot.start()) {
                end = end.min(run_end);
            }
            slots.push(Period::new_unchecked(slot.start(), end.max(slot.end())));
            from = end.max(slot.end());
        }

        slots
    }

    /// Window of the meeting duration at an admitted `start`, which always
    /// ends inside the timeframe.
    fn window_at(&self, start: DateTime<Utc>) -> Period {
        Period::new_unchecked(start, start + self.policy.meeting_duration())
    }

    /// Move `candidate` forward to the first admissible start, if any.
    fn admit(&self, mut candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let timeframe = self.policy.timeframe();
        let duration = self.policy.meeting_duration();
        loop {
            candidate = self.policy.align_up(candidate)?;
            let end = candidate.checked_add_signed(duration)?;
            if end > timeframe.end() {
                return None;
            }
            if !self.policy.is_allowed_day(candidate) {
                candidate = self.policy.next_allowed_day_start(candidate)?;
                continue;
            }
            match self.policy.allowed_run_end(candidate) {
                Some(run_end) if run_end < end => {
                    candidate = self.policy.next_allowed_day_start(run_end)?;
                }
                _ => return Some(candidate),
            }
        }
    }

    fn find_next_rescan(&self, from: DateTime<Utc>) -> SearchOutcome {
        let Some(mut candidate) = self.admit(from) else {
            return SearchOutcome::Exhausted { conflicts: 0 };
        };
        let mut last_conflicts = 0;

        loop {
            let mut in_conflict: BTreeSet<&AttendeeId> = BTreeSet::new();
            for (idx, constraint) in self.constraints.iter().enumerate() {
                let window = self.window_at(candidate);
                if let Some(busy) = period::first_overlapping(&constraint.busy, &window) {
                    in_conflict.insert(constraint.attendee);
                    // busy.end > candidate, so every advance makes progress.
                    match self.admit(busy.end()) {
                        Some(next) => candidate = next,
                        None => {
                            // Finish the pass against the last window that fit.
                            for rest in &self.constraints[idx + 1..] {
                                if period::first_overlapping(&rest.busy, &window).is_some() {
                                    in_conflict.insert(rest.attendee);
                                }
                            }
                            return SearchOutcome::Exhausted {
                                conflicts: in_conflict.len(),
                            };
                        }
                    }
                }
            }

            if in_conflict.is_empty() {
                return SearchOutcome::Found {
                    slot: self.window_at(candidate),
                    conflicts: last_conflicts,
                };
            }
            last_conflicts = in_conflict.len();
        }
    }

    fn find_next_merged(&self, from: DateTime<Utc>) -> SearchOutcome {
        let timeframe = self.policy.timeframe();
        let duration = self.policy.meeting_duration();
        let mut candidate = from;
        let mut last_conflicts = 0;

        loop {
            let Some(admitted) = self.admit(candidate) else {
                return SearchOutcome::Exhausted {
                    conflicts: last_conflicts,
                };
            };
            candidate = admitted;

            let window = self.window_at(candidate);
            let Some(gap) =
                period::first_gap_after(&self.merged, candidate, timeframe.end(), duration)
            else {
                return SearchOutcome::Exhausted {
                    conflicts: self.conflicts_at(&window),
                };
            };
            if gap.start() == candidate {
                return SearchOutcome::Found {
                    slot: window,
                    conflicts: last_conflicts,
                };
            }
            last_conflicts = self.conflicts_at(&window);
            candidate = gap.start();
        }
    }
}
