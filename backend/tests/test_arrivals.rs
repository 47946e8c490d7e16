//! Tests for arrival dispatch and the smart-dispatch backlog

use chip_simulator_core_rs::arrivals::{assign, ArrivalGenerator, Dispatch, DispatchPolicy, PendingBuffer};
use chip_simulator_core_rs::models::{EventSink, ProductionLine, ServiceOutcome, TimingTables};
use chip_simulator_core_rs::{Chip, Event, EventLog, RngManager, SimClock, StopSignal, Variate};
use std::sync::Arc;

fn lines(count: usize, machines: usize) -> Vec<ProductionLine> {
    let tables = Arc::new(TimingTables::new(
        vec![Variate::fixed(0.0)],
        vec![Variate::fixed(0.0)],
    ));
    (0..count)
        .map(|i| ProductionLine::new(i, machines, Arc::clone(&tables)))
        .collect()
}

#[test]
fn test_random_dispatch_reaches_every_line() {
    let lines = lines(4, 1);
    let pending = PendingBuffer::new();
    let mut gen = ArrivalGenerator::new(Variate::fixed(1.0), DispatchPolicy::Random, RngManager::new(3));

    for n in 1..=200 {
        assert!(matches!(
            gen.arrive(n, &lines, &pending, &EventSink::none()),
            Dispatch::Assigned(_)
        ));
    }
    for line in &lines {
        assert!(line.in_queue_count() > 20, "line {} starved", line.index());
    }
    assert!(pending.is_empty());
}

#[test]
fn test_arrival_event_carries_sampled_schedule() {
    let lines = lines(2, 3);
    let pending = PendingBuffer::new();
    let log = Arc::new(EventLog::new());
    let sink = EventSink::new(log.clone());
    let mut gen = ArrivalGenerator::new(Variate::fixed(1.0), DispatchPolicy::RoundRobin, RngManager::new(8));

    gen.arrive(2, &lines, &pending, &sink);

    let events = log.snapshot();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Arrival {
            line_idx,
            service_times,
            transfer_times,
            ..
        } => {
            assert_eq!(*line_idx, 1);
            assert_eq!(service_times.len(), 3);
            assert_eq!(transfer_times.len(), 2);
        }
        other => panic!("expected arrival, got {:?}", other),
    }
}

#[test]
fn test_smart_backlog_is_served_oldest_first() {
    let lines = lines(1, 1);
    let pending = PendingBuffer::new();
    let clock = SimClock::new(0.001);
    let signal = StopSignal::new();
    let events = EventSink::none();
    let mut gen = ArrivalGenerator::new(Variate::fixed(1.0), DispatchPolicy::Smart, RngManager::new(1));

    assert_eq!(gen.arrive(1, &lines, &pending, &events), Dispatch::Assigned(0));
    assert_eq!(gen.arrive(2, &lines, &pending, &events), Dispatch::Parked);
    assert_eq!(gen.arrive(3, &lines, &pending, &events), Dispatch::Parked);

    let mut order = Vec::new();
    loop {
        match lines[0].service_stage(0, &clock, &signal, &events) {
            ServiceOutcome::Completed(chip) => order.push(chip.ordinal()),
            _ => break,
        }
        pending.claim_for(&lines[0], &events);
    }
    assert_eq!(order, vec![1, 2, 3]);
    assert!(pending.is_empty());
}

#[test]
fn test_smart_newcomer_never_jumps_backlog() {
    let lines = lines(1, 1);
    let pending = PendingBuffer::new();
    let events = EventSink::none();
    let mut gen = ArrivalGenerator::new(Variate::fixed(1.0), DispatchPolicy::Smart, RngManager::new(1));

    pending.park(Chip::new(1, 0, vec![]));
    // The line is free, but an older chip is still parked
    assert!(lines[0].is_accepting());
    assert_eq!(gen.arrive(2, &lines, &pending, &events), Dispatch::Parked);
    assert_eq!(pending.len(), 2);
}

#[test]
fn test_assign_sets_line_and_queues_at_first_machine() {
    let lines = lines(3, 2);
    let chip = Chip::new(1, 0, vec![]);
    assert_eq!(assign(chip, &lines[2], &EventSink::none()), 1);
    assert_eq!(lines[2].machine(0).map(|m| m.queue_len()), Some(1));
    assert_eq!(lines[2].machine(1).map(|m| m.queue_len()), Some(0));
}
