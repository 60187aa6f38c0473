//! # slot-resolver
//!
//! Free/busy conflict resolution for meeting schedulers.
//!
//! Given meeting participants and a candidate timeframe, the resolver works out
//! which slots are free for every mandatory participant. Busy data arrives per
//! attendee, asynchronously and in any order; each arrival is merged and a
//! debounced sweep recomputes the free slots once the burst settles.
//!
//! ## Modules
//!
//! - [`period`] — Half-open periods: overlap, merge, gap search
//! - [`attendee`] — Per-attendee identity, role, merged busy periods, load state
//! - [`policy`] — Timeframe, weekday filter, mandatory roles, slot resolution
//! - [`slot_search`] — Find the next conflict-free window; enumerate all free slots
//! - [`resolver`] — `ConflictResolver` state machine with debounced sweeps
//! - [`debounce`] — Restart-on-trigger deadline
//! - [`observer`] — Per-resolver observers and the channel-backed observer
//! - [`fetch`] — Busy-period fetch collaborator trait and an in-memory fetcher
//! - [`service`] — Tokio task driving a resolver, with an async handle
//! - [`config`] — TOML configuration
//! - [`error`] — Error types

pub mod attendee;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fetch;
pub mod observer;
pub mod period;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod slot_search;

pub use attendee::{AttendeeBusyState, AttendeeId, LoadState, Role};
pub use config::ResolverConfig;
pub use error::ResolverError;
pub use fetch::{BusyPeriodFetcher, FetchError, FetchRequest, FetchResponse, StaticFetcher};
pub use observer::{ChannelObserver, ResolverEvent, ResolverObserver};
pub use period::{first_gap_after, merge_periods, Period};
pub use policy::{FailedAttendeePolicy, Policy, SweepStrategy, WeekdaySet};
pub use resolver::{ConflictResolver, ResolverStatus};
pub use service::{ResolverHandle, ResolverService};
pub use slot_search::{SearchOutcome, SlotSearch};
