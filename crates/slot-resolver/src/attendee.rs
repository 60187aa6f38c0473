//! Per-attendee busy state: identity, role, merged busy periods, load status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fetch::FetchTicket;
use crate::period::{self, Period};
use crate::policy::Policy;

/// Opaque attendee key. Compared byte-for-byte; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendeeId(String);

impl AttendeeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttendeeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AttendeeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Participation role of an attendee (RFC 5545 `ROLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Meeting chair / organizer.
    Chair,
    /// Participation required.
    Required,
    /// Participation optional.
    Optional,
    /// Copied for information only.
    NonParticipant,
}

/// Where an attendee's busy data stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    #[default]
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AttendeeBusyState {
    id: AttendeeId,
    role: Role,
    busy: Vec<Period>,
    load_state: LoadState,
    pending: Option<FetchTicket>,
    covered: Option<Period>,
}

impl AttendeeBusyState {
    pub fn new(id: AttendeeId, role: Role) -> Self {
        Self {
            id,
            role,
            busy: Vec::new(),
            load_state: LoadState::NotRequested,
            pending: None,
            covered: None,
        }
    }

    pub fn id(&self) -> &AttendeeId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Change the role. Busy data is kept; no refetch is needed.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Merged, sorted, non-overlapping busy periods.
    pub fn busy_periods(&self) -> &[Period] {
        &self.busy
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Ticket of the outstanding fetch, if any.
    pub fn pending_ticket(&self) -> Option<FetchTicket> {
        self.pending
    }

    pub fn is_mandatory(&self, policy: &Policy) -> bool {
        policy.mandatory_roles().contains(&self.role)
    }

    /// Whether the last successful fetch already covers `timeframe`.
    pub fn covers(&self, timeframe: &Period) -> bool {
        self.load_state == LoadState::Loaded
            && self.covered.is_some_and(|range| range.contains(timeframe))
    }

    /// Merge freshly received periods into the busy set and mark it loaded.
    ///
    /// `fetched` is the range the data was requested for.
    pub fn insert_busy_periods(&mut self, periods: &[Period], fetched: Period) {
        self.busy = period::merge_into(&self.busy, periods);
        self.covered = Some(match self.covered {
            Some(prev) if prev.overlaps(&fetched) || prev.end() == fetched.start() => {
                // Contiguous coverage; widen it.
                Period::new(
                    prev.start().min(fetched.start()),
                    prev.end().max(fetched.end()),
                )
                .unwrap_or(fetched)
            }
            _ => fetched,
        });
        self.load_state = LoadState::Loaded;
        self.pending = None;
    }

    pub fn begin_fetch(&mut self, ticket: FetchTicket) {
        self.pending = Some(ticket);
        self.load_state = LoadState::Loading;
    }

    pub fn mark_failed(&mut self) {
        self.pending = None;
        self.load_state = LoadState::Failed;
    }

    /// Forget the outstanding fetch without touching busy data.
    ///
    /// An attendee that never finished loading goes back to `NotRequested`.
    pub fn abandon_fetch(&mut self) {
        self.pending = None;
        if self.load_state == LoadState::Loading {
            self.load_state = if self.covered.is_some() {
                LoadState::Loaded
            } else {
                LoadState::NotRequested
            };
        }
    }

    /// Drop all busy data ahead of a reload.
    pub fn reset(&mut self) {
        self.busy.clear();
        self.covered = None;
        self.pending = None;
        self.load_state = LoadState::NotRequested;
    }
}
