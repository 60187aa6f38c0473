//! The conflict resolver: attendee bookkeeping, debounced recomputation and
//! result publication.
//!
//! `ConflictResolver` is a synchronous state machine with no I/O. Mutators
//! record what changed, queue fetch requests and restart the debounce timer;
//! they never sweep directly. A driver (see [`crate::service`]) drains
//! [`ConflictResolver::take_fetch_requests`], feeds responses back through
//! [`ConflictResolver::on_busy_periods_received`] and calls
//! [`ConflictResolver::poll_debounce`] once [`ConflictResolver::next_deadline`]
//! passes.
//!
//! ```text
//! Idle ──insert──▶ Loading ──responses + debounce──▶ Recomputing ──▶ Stable
//!                                                     ▲               │
//!                                                     └── debounce ───┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::attendee::{AttendeeBusyState, AttendeeId, LoadState, Role};
use crate::config::ResolverConfig;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::fetch::{FetchRequest, FetchResponse, FetchTicket};
use crate::observer::ResolverObserver;
use crate::period::Period;
use crate::policy::{FailedAttendeePolicy, Policy, SweepStrategy, WeekdaySet};
use crate::slot_search::{self, SlotSearch};

/// Lifecycle of a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverStatus {
    /// No sweep has completed and nothing is loading.
    Idle,
    /// At least one busy-period fetch is outstanding.
    Loading,
    /// The published slots reflect a completed sweep.
    Stable,
    /// A sweep is running.
    Recomputing,
}

pub struct ConflictResolver {
    attendees: BTreeMap<AttendeeId, AttendeeBusyState>,
    policy: Policy,
    available_slots: Vec<Period>,
    conflicts: usize,
    pending_recompute: bool,
    status: ResolverStatus,
    debounce: Debouncer,
    outbox: Vec<FetchRequest>,
    next_ticket: u64,
    sweeps: u64,
    observers: Vec<Box<dyn ResolverObserver>>,
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("attendees", &self.attendees.len())
            .field("policy", &self.policy)
            .field("status", &self.status)
            .field("available_slots", &self.available_slots.len())
            .field("pending_recompute", &self.pending_recompute)
            .field("sweeps", &self.sweeps)
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    pub fn new(policy: Policy) -> Self {
        Self::with_debounce(policy, crate::debounce::DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(policy: Policy, debounce: Duration) -> Self {
        Self {
            attendees: BTreeMap::new(),
            policy,
            available_slots: Vec::new(),
            conflicts: 0,
            pending_recompute: false,
            status: ResolverStatus::Idle,
            debounce: Debouncer::new(debounce),
            outbox: Vec::new(),
            next_ticket: 1,
            sweeps: 0,
            observers: Vec::new(),
        }
    }

    /// Build a resolver whose policy defaults and debounce come from `config`.
    pub fn from_config(
        config: &ResolverConfig,
        timeframe: Period,
        meeting_duration: TimeDelta,
    ) -> Result<Self> {
        let policy = config.policy(timeframe, meeting_duration)?;
        Ok(Self::with_debounce(policy, config.debounce()))
    }

    /// Register an observer for this resolver's sweeps.
    pub fn subscribe(&mut self, observer: impl ResolverObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub(crate) fn subscribe_boxed(&mut self, observer: Box<dyn ResolverObserver>) {
        self.observers.push(observer);
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn status(&self) -> ResolverStatus {
        self.status
    }

    pub fn attendee(&self, id: &AttendeeId) -> Option<&AttendeeBusyState> {
        self.attendees.get(id)
    }

    pub fn attendees(&self) -> impl Iterator<Item = &AttendeeBusyState> {
        self.attendees.values()
    }

    /// Slots from the last completed sweep. Empty before the first sweep.
    pub fn available_slots(&self) -> &[Period] {
        &self.available_slots
    }

    /// Conflict count published by the last completed sweep.
    pub fn conflicts(&self) -> usize {
        self.conflicts
    }

    /// Number of sweeps completed so far.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps
    }

    /// True when a change has not yet been reflected by a sweep.
    pub fn is_recompute_pending(&self) -> bool {
        self.pending_recompute
    }

    /// When the debounced sweep is due, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    // ── Attendees ───────────────────────────────────────────────────────────

    /// Add an attendee and request its busy periods.
    ///
    /// Inserting a known identity only updates its role. Returns `true` when a
    /// new attendee was added.
    pub fn insert_attendee(&mut self, id: impl Into<AttendeeId>, role: Role) -> bool {
        let id = id.into();
        if let Some(existing) = self.attendees.get_mut(&id) {
            if existing.role() != role {
                debug!(attendee = %id, ?role, "attendee role changed");
                existing.set_role(role);
                self.invalidate();
            }
            return false;
        }

        debug!(attendee = %id, ?role, "attendee added");
        self.attendees
            .insert(id.clone(), AttendeeBusyState::new(id.clone(), role));
        self.request_fetch(&id);
        self.invalidate();
        self.refresh_status();
        true
    }

    /// Drop an attendee and everything known about it.
    ///
    /// A fetch still in flight for it is ignored when it completes.
    pub fn remove_attendee(&mut self, id: &AttendeeId) -> bool {
        if self.attendees.remove(id).is_none() {
            return false;
        }
        debug!(attendee = %id, "attendee removed");
        self.outbox.retain(|request| &request.attendee != id);
        self.invalidate();
        self.refresh_status();
        true
    }

    pub fn clear_attendees(&mut self) {
        if self.attendees.is_empty() {
            return;
        }
        self.attendees.clear();
        self.outbox.clear();
        self.invalidate();
        self.refresh_status();
    }

    // ── Policy ──────────────────────────────────────────────────────────────

    pub fn set_allowed_weekdays(&mut self, weekdays: WeekdaySet) {
        self.policy.set_allowed_weekdays(weekdays);
        self.invalidate();
    }

    pub fn set_mandatory_roles(&mut self, roles: BTreeSet<Role>) {
        self.policy.set_mandatory_roles(roles);
        self.invalidate();
    }

    /// Change the search timeframe.
    ///
    /// Attendees whose loaded data does not cover the new timeframe are fetched
    /// again; data already held is kept and merged with the new answer.
    pub fn set_timeframe(&mut self, timeframe: Period) {
        self.policy.set_timeframe(timeframe);
        let stale: Vec<AttendeeId> = self
            .attendees
            .values()
            .filter(|attendee| !attendee.covers(&timeframe))
            .map(|attendee| attendee.id().clone())
            .collect();
        for id in &stale {
            self.request_fetch(id);
        }
        self.invalidate();
        self.refresh_status();
    }

    pub fn set_slot_resolution(&mut self, resolution: TimeDelta) -> Result<()> {
        self.policy.set_slot_resolution(resolution)?;
        self.invalidate();
        Ok(())
    }

    pub fn set_meeting_duration(&mut self, duration: TimeDelta) -> Result<()> {
        self.policy.set_meeting_duration(duration)?;
        self.invalidate();
        Ok(())
    }

    pub fn set_time_zone(&mut self, tz: Tz) {
        self.policy.set_time_zone(tz);
        self.invalidate();
    }

    pub fn set_failed_attendee_policy(&mut self, policy: FailedAttendeePolicy) {
        self.policy.set_failed_attendees(policy);
        self.invalidate();
    }

    pub fn set_strategy(&mut self, strategy: SweepStrategy) {
        self.policy.set_strategy(strategy);
        self.invalidate();
    }

    // ── Fetching ────────────────────────────────────────────────────────────

    /// Hand over the fetch requests queued since the last call.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply a fetch outcome.
    ///
    /// Responses for removed attendees, or carrying a ticket other than the
    /// attendee's current one, are ignored. Returns whether it was applied.
    pub fn on_busy_periods_received(&mut self, response: FetchResponse) -> bool {
        let Some(attendee) = self.attendees.get_mut(&response.attendee) else {
            debug!(attendee = %response.attendee, "ignoring busy periods for unknown attendee");
            return false;
        };
        if attendee.pending_ticket() != Some(response.ticket) {
            debug!(
                attendee = %response.attendee,
                ticket = response.ticket.value(),
                "ignoring stale busy periods"
            );
            return false;
        }

        match response.result {
            Ok(periods) => {
                debug!(
                    attendee = %response.attendee,
                    periods = periods.len(),
                    "busy periods received"
                );
                attendee.insert_busy_periods(&periods, response.timeframe);
            }
            Err(err) => {
                warn!(
                    attendee = %response.attendee,
                    error = %err,
                    policy = ?self.policy.failed_attendees(),
                    "free/busy fetch failed"
                );
                attendee.mark_failed();
            }
        }
        self.invalidate();
        self.refresh_status();
        true
    }

    /// Discard all busy data and fetch every attendee again.
    pub fn trigger_reload(&mut self) {
        let ids: Vec<AttendeeId> = self.attendees.keys().cloned().collect();
        for id in &ids {
            if let Some(attendee) = self.attendees.get_mut(id) {
                attendee.reset();
            }
            self.request_fetch(id);
        }
        self.invalidate();
        self.refresh_status();
    }

    /// Abort outstanding fetches and any scheduled sweep, without recomputing.
    pub fn cancel_reload(&mut self) {
        self.outbox.clear();
        for attendee in self.attendees.values_mut() {
            attendee.abandon_fetch();
        }
        self.debounce.cancel();
        self.pending_recompute = false;
        debug!("reload cancelled");
        self.refresh_status();
    }

    // ── Sweeping ────────────────────────────────────────────────────────────

    /// Run the debounced sweep if its deadline has passed.
    pub fn poll_debounce(&mut self) -> bool {
        if self.debounce.fire_if_due() {
            self.sweep();
            true
        } else {
            false
        }
    }

    /// Sweep immediately, bypassing (and cancelling) the debounce timer.
    pub fn find_all_free_slots(&mut self) -> &[Period] {
        self.debounce.cancel();
        self.sweep();
        &self.available_slots
    }

    fn sweep(&mut self) {
        self.transition(ResolverStatus::Recomputing);

        let (slots, conflicts) = {
            let constraints =
                slot_search::mandatory_constraints(&self.policy, self.attendees.values());
            let search = SlotSearch::new(&self.policy, constraints);
            let conflicts = search.conflicts_at(&self.policy.requested_window());
            (search.find_all(), conflicts)
        };

        self.available_slots = slots;
        self.conflicts = conflicts;
        self.pending_recompute = false;
        self.sweeps += 1;
        info!(
            slots = self.available_slots.len(),
            conflicts,
            sweep = self.sweeps,
            "free/busy sweep completed"
        );

        for observer in &mut self.observers {
            observer.conflicts_detected(conflicts);
            observer.free_slots_available(&self.available_slots);
        }
        self.refresh_status();
    }

    fn invalidate(&mut self) {
        self.pending_recompute = true;
        self.debounce.trigger();
    }

    fn request_fetch(&mut self, id: &AttendeeId) {
        let Some(attendee) = self.attendees.get_mut(id) else {
            return;
        };
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        attendee.begin_fetch(ticket);
        self.outbox.retain(|request| &request.attendee != id);
        self.outbox.push(FetchRequest {
            attendee: id.clone(),
            timeframe: self.policy.timeframe(),
            ticket,
        });
    }

    fn refresh_status(&mut self) {
        let loading = self
            .attendees
            .values()
            .any(|attendee| attendee.load_state() == LoadState::Loading);
        // Data that finished loading stays `Loading` until a sweep reflects it.
        let awaiting_sweep = self.status == ResolverStatus::Loading && self.pending_recompute;
        let status = if loading || awaiting_sweep {
            ResolverStatus::Loading
        } else if self.sweeps > 0 {
            ResolverStatus::Stable
        } else {
            ResolverStatus::Idle
        };
        self.transition(status);
    }

    fn transition(&mut self, status: ResolverStatus) {
        if self.status == status {
            return;
        }
        debug!(from = ?self.status, to = ?status, "resolver status changed");
        self.status = status;
        for observer in &mut self.observers {
            observer.status_changed(status);
        }
    }
}
