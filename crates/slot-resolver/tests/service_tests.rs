//! Tests for the async resolver service and the in-memory fetcher.
//!
//! Runs on a paused tokio clock: the runtime jumps straight to the next timer
//! whenever every task is idle, so debounce windows and fetch latency cost no
//! real time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use slot_resolver::{
    AttendeeId, BusyPeriodFetcher, ChannelObserver, ConflictResolver, Period, Policy,
    ResolverError, ResolverEvent, ResolverHandle, ResolverService, ResolverStatus, Role,
    StaticFetcher,
};
use tokio::sync::mpsc::UnboundedReceiver;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 16, hour, min, 0).unwrap()
}

fn period(start_hour: u32, start_min: u32, end_hour: u32, end_min: u32) -> Period {
    Period::new(at(start_hour, start_min), at(end_hour, end_min)).unwrap()
}

fn start(fetcher: StaticFetcher) -> (ResolverHandle, UnboundedReceiver<ResolverEvent>) {
    let policy = Policy::new(period(9, 0, 17, 0), TimeDelta::hours(1)).unwrap();
    let resolver = ConflictResolver::with_debounce(policy, Duration::from_millis(250));
    let (handle, _task) = ResolverService::spawn(resolver, Arc::new(fetcher));
    let (observer, events) = ChannelObserver::new();
    handle.subscribe(observer).unwrap();
    (handle, events)
}

/// Wait for the next published slot list.
async fn next_slots(events: &mut UnboundedReceiver<ResolverEvent>) -> Vec<Period> {
    loop {
        match events.recv().await {
            Some(ResolverEvent::FreeSlotsAvailable(slots)) => return slots,
            Some(_) => continue,
            None => panic!("resolver service stopped"),
        }
    }
}

fn sweeps_pending(events: &mut UnboundedReceiver<ResolverEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ResolverEvent::FreeSlotsAvailable(_)) {
            count += 1;
        }
    }
    count
}

// ── Service ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn burst_of_attendees_produces_one_sweep_with_all_data() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(10, 0, 11, 0)])
        .with_busy("bob", vec![period(9, 0, 10, 0)]);
    let (handle, mut events) = start(fetcher);

    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.insert_attendee("bob", Role::Required).unwrap();
    handle.insert_attendee("carol", Role::Optional).unwrap();

    let slots = next_slots(&mut events).await;
    assert_eq!(slots, vec![period(11, 0, 17, 0)]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sweeps_pending(&mut events), 0, "no further sweep without changes");
    assert_eq!(handle.available_slots().await.unwrap(), slots);
    assert_eq!(handle.status().await.unwrap(), ResolverStatus::Stable);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_triggers_recompute_on_arrival() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(9, 0, 12, 0)])
        .with_latency(Duration::from_secs(2));
    let (handle, mut events) = start(fetcher);

    handle.insert_attendee("alice", Role::Required).unwrap();

    // Debounce fires before the data arrives: alice is still unconstrained.
    assert_eq!(next_slots(&mut events).await, vec![period(9, 0, 17, 0)]);
    // The late answer schedules another sweep.
    assert_eq!(next_slots(&mut events).await, vec![period(12, 0, 17, 0)]);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_does_not_stop_the_service() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(13, 0, 14, 0)])
        .fail("bob");
    let (handle, mut events) = start(fetcher);

    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.insert_attendee("bob", Role::Required).unwrap();

    assert_eq!(
        next_slots(&mut events).await,
        vec![period(9, 0, 13, 0), period(14, 0, 17, 0)]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_reload_aborts_fetches_and_pending_sweep() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(9, 0, 17, 0)])
        .with_latency(Duration::from_secs(5));
    let (handle, mut events) = start(fetcher);

    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.cancel_reload().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(sweeps_pending(&mut events), 0);
    assert_eq!(handle.status().await.unwrap(), ResolverStatus::Idle);
    assert!(handle.available_slots().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn find_all_free_slots_answers_immediately() {
    let fetcher = StaticFetcher::new().with_busy("alice", vec![period(9, 0, 10, 0)]);
    let (handle, mut events) = start(fetcher);
    handle.insert_attendee("alice", Role::Required).unwrap();
    next_slots(&mut events).await;

    let slots = handle.find_all_free_slots().await.unwrap();

    assert_eq!(slots, vec![period(10, 0, 17, 0)]);
}

#[tokio::test(start_paused = true)]
async fn removing_attendee_mid_fetch_ignores_its_answer() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(9, 0, 17, 0)])
        .with_latency(Duration::from_secs(1));
    let (handle, mut events) = start(fetcher);

    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.remove_attendee("alice").unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let slots = handle.find_all_free_slots().await.unwrap();
    assert_eq!(slots, vec![period(9, 0, 17, 0)]);
    assert!(sweeps_pending(&mut events) >= 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_setter_reports_error_through_handle() {
    let (handle, _events) = start(StaticFetcher::new());

    let result = handle.set_slot_resolution(TimeDelta::zero()).await;
    assert!(matches!(result, Err(ResolverError::InvalidSlotResolution(_))));

    assert!(handle
        .set_meeting_duration(TimeDelta::minutes(30))
        .await
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn handle_reports_closed_service() {
    let policy = Policy::new(period(9, 0, 17, 0), TimeDelta::hours(1)).unwrap();
    let (handle, task) =
        ResolverService::spawn(ConflictResolver::new(policy), Arc::new(StaticFetcher::new()));

    task.abort();
    let _ = task.await;

    assert!(matches!(
        handle.insert_attendee("alice", Role::Required),
        Err(ResolverError::ServiceClosed)
    ));
    assert!(matches!(
        handle.available_slots().await,
        Err(ResolverError::ServiceClosed)
    ));
}

#[tokio::test(start_paused = true)]
async fn conflicts_reflect_last_sweep() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(9, 0, 9, 30)])
        .with_busy("bob", vec![period(9, 30, 10, 30)]);
    let (handle, mut events) = start(fetcher);

    assert_eq!(handle.conflicts().await.unwrap(), 0);
    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.insert_attendee("bob", Role::Chair).unwrap();
    next_slots(&mut events).await;

    // Both are busy somewhere in 09:00-10:00.
    assert_eq!(handle.conflicts().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_applies_queued_commands_then_stops() {
    let policy = Policy::new(period(9, 0, 17, 0), TimeDelta::hours(1)).unwrap();
    let (handle, task) =
        ResolverService::spawn(ConflictResolver::new(policy), Arc::new(StaticFetcher::new()));
    let (observer, mut events) = ChannelObserver::new();
    handle.subscribe(observer).unwrap();

    handle.insert_attendee("alice", Role::Required).unwrap();
    handle.shutdown().unwrap();
    task.await.unwrap();

    assert!(matches!(
        events.recv().await,
        Some(ResolverEvent::StatusChanged(ResolverStatus::Loading))
    ));
    assert!(matches!(
        handle.insert_attendee("bob", Role::Required),
        Err(ResolverError::ServiceClosed)
    ));
}

// ── StaticFetcher ───────────────────────────────────────────────────────────

#[tokio::test]
async fn static_fetcher_clips_to_timeframe_and_merges() {
    let fetcher = StaticFetcher::new()
        .with_busy("alice", vec![period(8, 0, 10, 0), period(9, 30, 11, 0)])
        .with_busy("alice", vec![period(16, 0, 18, 0)]);

    let busy = fetcher
        .request_busy_periods(&AttendeeId::new("alice"), period(9, 0, 17, 0))
        .await
        .unwrap();

    assert_eq!(busy, vec![period(9, 0, 11, 0), period(16, 0, 17, 0)]);
}

#[tokio::test]
async fn static_fetcher_unknown_attendee_is_free() {
    let busy = StaticFetcher::new()
        .request_busy_periods(&AttendeeId::new("nobody"), period(9, 0, 17, 0))
        .await
        .unwrap();
    assert!(busy.is_empty());
}

#[tokio::test]
async fn static_fetcher_reports_configured_failures() {
    let result = StaticFetcher::new()
        .fail("bob")
        .request_busy_periods(&AttendeeId::new("bob"), period(9, 0, 17, 0))
        .await;
    assert!(result.is_err());
}
