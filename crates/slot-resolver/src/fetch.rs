//! The busy-period fetch collaborator.
//!
//! The resolver never performs I/O itself. It queues [`FetchRequest`]s, a driver
//! hands them to a [`BusyPeriodFetcher`], and the outcome comes back as a
//! [`FetchResponse`] carrying the request's ticket. Tickets let the resolver
//! drop responses for attendees that were removed or re-requested meanwhile.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::attendee::AttendeeId;
use crate::period::{self, Period};

/// Identifies one fetch request. Strictly increasing per resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(pub(crate) u64);

impl FetchTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub attendee: AttendeeId,
    pub timeframe: Period,
    pub ticket: FetchTicket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub attendee: AttendeeId,
    /// Range the data was requested for.
    pub timeframe: Period,
    pub ticket: FetchTicket,
    pub result: Result<Vec<Period>, FetchError>,
}

impl FetchRequest {
    /// Pair this request with the fetcher's outcome.
    pub fn respond(self, result: Result<Vec<Period>, FetchError>) -> FetchResponse {
        FetchResponse {
            attendee: self.attendee,
            timeframe: self.timeframe,
            ticket: self.ticket,
            result,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Free/busy lookup failed: {0}")]
    Unavailable(String),
}

/// Retrieves an attendee's busy periods for a timeframe.
///
/// Implementations own retries and timeouts; the resolver treats any `Err` as a
/// final answer for that request.
#[async_trait]
pub trait BusyPeriodFetcher: Send + Sync {
    async fn request_busy_periods(
        &self,
        attendee: &AttendeeId,
        timeframe: Period,
    ) -> Result<Vec<Period>, FetchError>;
}

/// In-memory fetcher backed by a fixed table of busy periods.
///
/// Unknown attendees are reported as free. Attendees marked with
/// [`StaticFetcher::fail`] always return an error.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    busy: HashMap<AttendeeId, Vec<Period>>,
    failing: HashSet<AttendeeId>,
    latency: Option<Duration>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy(mut self, attendee: impl Into<AttendeeId>, periods: Vec<Period>) -> Self {
        self.busy.entry(attendee.into()).or_default().extend(periods);
        self
    }

    pub fn fail(mut self, attendee: impl Into<AttendeeId>) -> Self {
        self.failing.insert(attendee.into());
        self
    }

    /// Delay every answer by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl BusyPeriodFetcher for StaticFetcher {
    async fn request_busy_periods(
        &self,
        attendee: &AttendeeId,
        timeframe: Period,
    ) -> Result<Vec<Period>, FetchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(attendee) {
            return Err(FetchError::Unavailable(format!("lookup for {attendee} failed")));
        }
        let periods = self
            .busy
            .get(attendee)
            .map(|periods| {
                periods
                    .iter()
                    .filter_map(|p| p.clip(&timeframe))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(period::merge_periods(periods))
    }
}
