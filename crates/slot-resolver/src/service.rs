//! Async driver for a [`ConflictResolver`].
//!
//! The resolver runs inside a single tokio task, so all of its state is only
//! ever touched from one place. Callers talk to it through a cloneable
//! [`ResolverHandle`]. The task waits on three things at once: incoming
//! commands, completed busy-period fetches, and the debounce deadline.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::attendee::{AttendeeId, Role};
use crate::error::{ResolverError, Result};
use crate::fetch::{BusyPeriodFetcher, FetchResponse};
use crate::observer::ResolverObserver;
use crate::period::Period;
use crate::policy::WeekdaySet;
use crate::resolver::{ConflictResolver, ResolverStatus};

enum Command {
    InsertAttendee(AttendeeId, Role),
    RemoveAttendee(AttendeeId),
    SetAllowedWeekdays(WeekdaySet),
    SetMandatoryRoles(BTreeSet<Role>),
    SetTimeframe(Period),
    SetSlotResolution(TimeDelta, oneshot::Sender<Result<()>>),
    SetMeetingDuration(TimeDelta, oneshot::Sender<Result<()>>),
    TriggerReload,
    CancelReload,
    FindAllFreeSlots(oneshot::Sender<Vec<Period>>),
    AvailableSlots(oneshot::Sender<Vec<Period>>),
    Conflicts(oneshot::Sender<usize>),
    Status(oneshot::Sender<ResolverStatus>),
    Subscribe(Box<dyn ResolverObserver>),
    Shutdown,
}

pub struct ResolverService {
    resolver: ConflictResolver,
    fetcher: Arc<dyn BusyPeriodFetcher>,
    fetches: JoinSet<FetchResponse>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl ResolverService {
    /// Start the resolver task on the current tokio runtime.
    ///
    /// The task ends once every [`ResolverHandle`] has been dropped.
    pub fn spawn(
        resolver: ConflictResolver,
        fetcher: Arc<dyn BusyPeriodFetcher>,
    ) -> (ResolverHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = ResolverService {
            resolver,
            fetcher,
            fetches: JoinSet::new(),
            commands: rx,
        };
        let task = tokio::spawn(service.run());
        (ResolverHandle { tx }, task)
    }

    async fn run(mut self) {
        loop {
            self.dispatch_fetches();
            let deadline = self.resolver.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok(response) => {
                            self.resolver.on_busy_periods_received(response);
                        }
                        Err(err) if err.is_cancelled() => {}
                        Err(err) => warn!(error = %err, "busy-period fetch task failed"),
                    }
                }
                _ = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.resolver.poll_debounce();
                }
            }
        }

        self.fetches.abort_all();
        debug!("resolver service stopped");
    }

    fn dispatch_fetches(&mut self) {
        for request in self.resolver.take_fetch_requests() {
            let fetcher = Arc::clone(&self.fetcher);
            self.fetches.spawn(async move {
                let result = fetcher
                    .request_busy_periods(&request.attendee, request.timeframe)
                    .await;
                request.respond(result)
            });
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::InsertAttendee(id, role) => {
                self.resolver.insert_attendee(id, role);
            }
            Command::RemoveAttendee(id) => {
                self.resolver.remove_attendee(&id);
            }
            Command::SetAllowedWeekdays(weekdays) => self.resolver.set_allowed_weekdays(weekdays),
            Command::SetMandatoryRoles(roles) => self.resolver.set_mandatory_roles(roles),
            Command::SetTimeframe(timeframe) => self.resolver.set_timeframe(timeframe),
            Command::SetSlotResolution(resolution, reply) => {
                let _ = reply.send(self.resolver.set_slot_resolution(resolution));
            }
            Command::SetMeetingDuration(duration, reply) => {
                let _ = reply.send(self.resolver.set_meeting_duration(duration));
            }
            Command::TriggerReload => self.resolver.trigger_reload(),
            Command::CancelReload => {
                self.resolver.cancel_reload();
                self.fetches.abort_all();
            }
            Command::FindAllFreeSlots(reply) => {
                let slots = self.resolver.find_all_free_slots().to_vec();
                let _ = reply.send(slots);
            }
            Command::AvailableSlots(reply) => {
                let _ = reply.send(self.resolver.available_slots().to_vec());
            }
            Command::Conflicts(reply) => {
                let _ = reply.send(self.resolver.conflicts());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.resolver.status());
            }
            Command::Subscribe(observer) => self.resolver.subscribe_boxed(observer),
            // Commands already queued are still applied before the loop ends.
            Command::Shutdown => self.commands.close(),
        }
    }
}

/// Cloneable handle to a running [`ResolverService`].
///
/// Every method fails with [`ResolverError::ServiceClosed`] once the service
/// task has stopped.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ResolverHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| ResolverError::ServiceClosed)
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx))?;
        reply_rx.await.map_err(|_| ResolverError::ServiceClosed)
    }

    pub fn insert_attendee(&self, id: impl Into<AttendeeId>, role: Role) -> Result<()> {
        self.send(Command::InsertAttendee(id.into(), role))
    }

    pub fn remove_attendee(&self, id: impl Into<AttendeeId>) -> Result<()> {
        self.send(Command::RemoveAttendee(id.into()))
    }

    pub fn set_allowed_weekdays(&self, weekdays: WeekdaySet) -> Result<()> {
        self.send(Command::SetAllowedWeekdays(weekdays))
    }

    pub fn set_mandatory_roles(&self, roles: BTreeSet<Role>) -> Result<()> {
        self.send(Command::SetMandatoryRoles(roles))
    }

    pub fn set_timeframe(&self, timeframe: Period) -> Result<()> {
        self.send(Command::SetTimeframe(timeframe))
    }

    pub async fn set_slot_resolution(&self, resolution: TimeDelta) -> Result<()> {
        self.ask(|reply| Command::SetSlotResolution(resolution, reply))
            .await?
    }

    pub async fn set_meeting_duration(&self, duration: TimeDelta) -> Result<()> {
        self.ask(|reply| Command::SetMeetingDuration(duration, reply))
            .await?
    }

    pub fn trigger_reload(&self) -> Result<()> {
        self.send(Command::TriggerReload)
    }

    pub fn cancel_reload(&self) -> Result<()> {
        self.send(Command::CancelReload)
    }

    /// Sweep now and return the resulting slots.
    pub async fn find_all_free_slots(&self) -> Result<Vec<Period>> {
        self.ask(Command::FindAllFreeSlots).await
    }

    /// Slots from the last completed sweep.
    pub async fn available_slots(&self) -> Result<Vec<Period>> {
        self.ask(Command::AvailableSlots).await
    }

    /// Conflict count from the last completed sweep.
    pub async fn conflicts(&self) -> Result<usize> {
        self.ask(Command::Conflicts).await
    }

    pub async fn status(&self) -> Result<ResolverStatus> {
        self.ask(Command::Status).await
    }

    pub fn subscribe(&self, observer: impl ResolverObserver + 'static) -> Result<()> {
        self.send(Command::Subscribe(Box::new(observer)))
    }

    /// Stop the service once the commands sent so far have been applied.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}
