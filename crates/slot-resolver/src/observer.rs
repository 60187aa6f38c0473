//! Per-resolver observer registration.
//!
//! Observers are registered on one [`ConflictResolver`](crate::ConflictResolver)
//! and are called synchronously from it. There is no process-wide registry.

use tokio::sync::mpsc;

use crate::period::Period;
use crate::resolver::ResolverStatus;

/// Receives the results of completed sweeps.
///
/// All methods default to no-ops so observers implement only what they need.
pub trait ResolverObserver: Send {
    /// Number of mandatory attendees busy during the requested meeting window.
    fn conflicts_detected(&mut self, _count: usize) {}

    /// Free slots found by the sweep, sorted and non-overlapping.
    fn free_slots_available(&mut self, _slots: &[Period]) {}

    fn status_changed(&mut self, _status: ResolverStatus) {}
}

/// Owned form of an observer notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverEvent {
    ConflictsDetected(usize),
    FreeSlotsAvailable(Vec<Period>),
    StatusChanged(ResolverStatus),
}

/// Forwards every notification into an unbounded channel.
///
/// Notifications sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ResolverEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResolverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ResolverEvent) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.tx.send(event);
    }
}

impl ResolverObserver for ChannelObserver {
    fn conflicts_detected(&mut self, count: usize) {
        self.send(ResolverEvent::ConflictsDetected(count));
    }

    fn free_slots_available(&mut self, slots: &[Period]) {
        self.send(ResolverEvent::FreeSlotsAvailable(slots.to_vec()));
    }

    fn status_changed(&mut self, status: ResolverStatus) {
        self.send(ResolverEvent::StatusChanged(status));
    }
}
