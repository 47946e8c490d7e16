//! Tests for a single machine: FIFO service, counters and interruption

use chip_simulator_core_rs::models::{Machine, ServiceOutcome};
use chip_simulator_core_rs::{Chip, SimClock, StageTiming, StopSignal};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 1 simulated second = 1ms
const FAST: f64 = 0.001;

fn chip(ordinal: u64, service_secs: f64) -> Chip {
    Chip::new(
        ordinal,
        0,
        vec![StageTiming {
            service_secs,
            transfer_secs: 0.0,
        }],
    )
}

#[test]
fn test_serves_in_fifo_order() {
    let machine = Machine::new(0, 0);
    let clock = SimClock::new(FAST);
    let signal = StopSignal::new();

    for n in 1..=3 {
        machine.enqueue(chip(n, 1.0));
    }

    let mut served = Vec::new();
    while let ServiceOutcome::Completed(chip) = machine.service_next(&clock, &signal) {
        served.push(chip.ordinal());
    }
    assert_eq!(served, vec![1, 2, 3]);
    assert_eq!(machine.processed_count(), 3);
    assert_eq!(machine.queue_len(), 0);
}

#[test]
fn test_average_service_time_uses_sampled_durations() {
    let machine = Machine::new(0, 0);
    let clock = SimClock::new(FAST);
    let signal = StopSignal::new();

    machine.enqueue(chip(1, 2.0));
    machine.enqueue(chip(2, 4.0));
    while let ServiceOutcome::Completed(_) = machine.service_next(&clock, &signal) {}

    assert_eq!(machine.processed_count(), 2);
    assert!((machine.average_service_time() - 3.0).abs() < 1e-9);
    // busy 6 simulated seconds of a 60 second shift
    assert!((machine.utilization(60.0) - 0.1).abs() < 1e-9);
}

#[test]
fn test_queue_time_is_measured_in_simulated_seconds() {
    let machine = Machine::new(0, 0);
    let clock = SimClock::new(FAST);
    let signal = StopSignal::new();

    machine.enqueue(chip(1, 0.0));
    thread::sleep(Duration::from_millis(20));
    assert!(matches!(
        machine.service_next(&clock, &signal),
        ServiceOutcome::Completed(_)
    ));

    // 20ms wall at 1ms per simulated second ≈ 20 simulated seconds
    let waited = machine.average_queue_time();
    assert!(waited >= 19.0, "queue time was {}", waited);
}

#[test]
fn test_max_queue_length_is_monotone() {
    let machine = Machine::new(0, 0);
    let clock = SimClock::new(FAST);
    let signal = StopSignal::new();

    let mut last_max = 0;
    for round in 0..4 {
        for n in 0..=round {
            machine.enqueue(chip(n as u64, 0.0));
        }
        machine.service_next(&clock, &signal);
        let max = machine.max_queue_length();
        assert!(max >= last_max);
        last_max = max;
    }
    assert!(last_max >= 4);
}

#[test]
fn test_utilization_never_exceeds_one() {
    let machine = Machine::new(0, 0);
    let clock = SimClock::new(FAST);
    let signal = StopSignal::new();

    machine.enqueue(chip(1, 10.0));
    machine.service_next(&clock, &signal);
    assert_eq!(machine.utilization(5.0), 1.0);
    assert_eq!(machine.utilization(0.0), 0.0);
}

#[test]
fn test_interrupted_service_requeues_chip_without_stats() {
    let machine = Arc::new(Machine::new(0, 0));
    // Real time: the 60 second service cannot finish in this test
    let clock = SimClock::new(1.0);
    let signal = Arc::new(StopSignal::new());

    machine.enqueue(chip(1, 60.0));
    machine.enqueue(chip(2, 60.0));

    let worker = {
        let machine = Arc::clone(&machine);
        let signal = Arc::clone(&signal);
        thread::spawn(move || machine.service_next(&clock, &signal))
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    while !machine.in_service() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(machine.in_service());
    assert_eq!(machine.queue_len(), 1);

    let stopped_at = Instant::now();
    signal.trigger();
    let outcome = worker.join().unwrap();
    assert!(stopped_at.elapsed() < Duration::from_secs(1));

    assert!(matches!(outcome, ServiceOutcome::Interrupted));
    assert!(!machine.in_service());
    assert_eq!(machine.queue_len(), 2);
    assert_eq!(machine.processed_count(), 0);
    assert_eq!(machine.average_service_time(), 0.0);
}

#[test]
fn test_requeue_after_interrupt_updates_max_queue_length() {
    let machine = Arc::new(Machine::new(0, 0));
    let clock = SimClock::new(1.0);
    let signal = Arc::new(StopSignal::new());

    machine.enqueue(chip(1, 60.0));
    let worker = {
        let machine = Arc::clone(&machine);
        let signal = Arc::clone(&signal);
        thread::spawn(move || machine.service_next(&clock, &signal))
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    while !machine.in_service() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(machine.in_service());
    machine.enqueue(chip(2, 60.0));
    assert_eq!(machine.max_queue_length(), 1);

    signal.trigger();
    assert!(matches!(worker.join().unwrap(), ServiceOutcome::Interrupted));

    assert_eq!(machine.queue_len(), 2);
    assert!(machine.max_queue_length() >= machine.queue_len());
    assert_eq!(machine.processed_count(), 0);
}

#[test]
fn test_wait_for_work_wakes_on_enqueue() {
    let machine = Arc::new(Machine::new(0, 0));
    let signal = Arc::new(StopSignal::new());

    let waiter = {
        let machine = Arc::clone(&machine);
        let signal = Arc::clone(&signal);
        thread::spawn(move || machine.wait_for_work(&signal, Duration::from_secs(5)))
    };
    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    machine.enqueue(chip(1, 1.0));
    assert!(waiter.join().unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_wait_for_work_times_out_when_idle() {
    let machine = Machine::new(0, 0);
    let signal = StopSignal::new();
    assert!(!machine.wait_for_work(&signal, Duration::from_millis(10)));
}
